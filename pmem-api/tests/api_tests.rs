//! PMEM API tests

use pmem_api::collections::HashMap;
use pmem_api::{
    CommandStatus, DimmId, DimmUid, Error, ErrorContext, NvmStatusCode, ObjectId, SocketId, GIB,
    round_down, round_up,
};

#[test]
fn test_status_warnings_filter() {
    // Advisories ride along with a successful command
    let mut status = CommandStatus::new();
    status.set_object_status(
        ObjectId::Socket(SocketId(0)),
        NvmStatusCode::WarnMappedMemReducedDueToCpuSku,
    );
    status.set_object_status(ObjectId::Dimm(DimmId(1)), NvmStatusCode::Success);
    assert_eq!(status.general, NvmStatusCode::Success);
    assert_eq!(status.warnings().count(), 1);
    assert!(!status.has_errors());
    assert!(status.contains(NvmStatusCode::WarnMappedMemReducedDueToCpuSku));
}

#[test]
fn test_status_general_and_object() {
    let mut status = CommandStatus::new();
    let dimm = ObjectId::Dimm(DimmId(0x1001));
    status.set_object_status_and_general(dimm, NvmStatusCode::RegionConfApplyingFailed);
    assert_eq!(status.general, NvmStatusCode::RegionConfApplyingFailed);
    assert!(status.has_object_status(dimm));
    assert!(!status.has_object_status(ObjectId::Dimm(DimmId(0x1002))));
}

#[test]
fn test_error_context_chain() {
    let result: pmem_api::Result<u64> = Err(Error::Unsupported("sku".into()));
    let err = result.context("create goal").context("socket 0").unwrap_err();
    assert_eq!(err, Error::Unsupported("socket 0: create goal: sku".into()));
}

#[test]
fn test_uid_completeness() {
    let uid = DimmUid { vendor_id: 0x8089, serial_number: 0xdead, ..Default::default() };
    assert!(uid.is_complete());
    assert!(!DimmUid::default().is_complete());
}

#[test]
fn test_alignment_helpers() {
    assert_eq!(round_up(1, GIB), GIB);
    assert_eq!(round_down(127 * GIB + 5, 32 * GIB), 96 * GIB);
}

#[test]
fn test_collections_reexport() {
    let mut by_id: HashMap<DimmId, u64> = HashMap::new();
    by_id.insert(DimmId(3), 128 * GIB);
    assert_eq!(by_id.get(&DimmId(3)), Some(&(128 * GIB)));
}
