//! Capacity template resolution
//!
//! Turns a per-socket request (volatile bytes, persistent type, reserved
//! bytes) into per-module symmetric and asymmetric splits and the abstract
//! goal templates the builder expands later. Topology is not consulted
//! here.

use alloc::vec::Vec;

use pmem_api::{
    CommandStatus, Error, NvmStatusCode, ObjectId, Result, SocketId, aborted, invalid_parameter, pmem_debug,
    pmem_info, round_down, round_up,
};

use crate::config::Alignments;
use crate::dimm::Dimm;
use crate::goal::{InterleaveSetType, RegionGoalDimm, RegionGoalTemplate};
use crate::platform::{MaxPmInterleaveSets, PlatformCapabilities};
use crate::reduce::{reduce_app_direct, tolerate_exhausted};

/// Persistent memory layout requested for the non-volatile share
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PersistentMemoryType {
    /// One interleaved set across the socket plus leftovers
    #[default]
    AppDirect = 0x1,
    /// One set per module
    AppDirectNotInterleaved = 0x2,
    /// Left unmapped
    Storage = 0x4,
}

impl TryFrom<u8> for PersistentMemoryType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x1 => Ok(PersistentMemoryType::AppDirect),
            0x2 => Ok(PersistentMemoryType::AppDirectNotInterleaved),
            0x4 => Ok(PersistentMemoryType::Storage),
            _ => Err(invalid_parameter("unknown persistent memory type")),
        }
    }
}

impl PersistentMemoryType {
    /// Whether the type maps capacity as AppDirect
    pub fn is_app_direct(self) -> bool {
        !matches!(self, PersistentMemoryType::Storage)
    }
}

/// Per-module capacity split for one socket
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapacitySplit {
    /// Shares interleaved across modules (or one per module for AD-NI)
    pub symmetrical: Vec<RegionGoalDimm>,
    /// Leftover AppDirect capacity on larger modules
    pub asymmetrical: Vec<RegionGoalDimm>,
    /// Volatile bytes actually granted on the socket
    pub volatile_actual: u64,
}

impl CapacitySplit {
    /// Total AppDirect capacity in both lists
    pub fn persistent_total(&self) -> u64 {
        self.symmetrical
            .iter()
            .chain(self.asymmetrical.iter())
            .map(|dimm| dimm.region_size)
            .sum()
    }
}

/// Volatile request for one socket
#[derive(Debug, Clone, Copy)]
pub struct TemplateRequest {
    /// Socket being resolved
    pub socket: SocketId,
    /// Volatile bytes requested across the socket
    pub volatile_size: u64,
    /// Layout of the persistent share
    pub pm_type: PersistentMemoryType,
    /// Bytes to leave unmapped
    pub reserved_size: u64,
}

/// Volatile bytes a module of `raw` capacity actually gets for `requested`
///
/// A non-zero request below one volatile unit is rounded up. The persistent
/// remainder is rounded to the partition alignment, half up, and never
/// rounded down to nothing.
pub fn calculate_actual_volatile_size(alignments: &Alignments, raw: u64, requested: u64) -> u64 {
    let mut requested = requested;
    if requested != 0 && requested < alignments.volatile {
        requested = alignments.volatile;
    }
    if raw <= requested {
        return raw;
    }
    if requested == 0 {
        return 0;
    }

    let partition = alignments.partition;
    let mut persistent = raw - requested;
    if partition != 0 && persistent % partition > partition / 2 {
        persistent = round_up(persistent, partition);
    } else {
        persistent = round_down(persistent, partition);
        if persistent == 0 {
            persistent = partition;
        }
    }

    if persistent >= raw {
        // keep at least one partition of volatile
        raw - (persistent - partition)
    } else {
        raw - persistent
    }
}

/// Bytes covered by `percent` of the modules' raw capacity
pub fn calculate_dimm_capacity_from_percent(dimms: &[&Dimm], percent: u32) -> Result<u64> {
    if percent > 100 {
        return Err(invalid_parameter("capacity percent above 100"));
    }
    let raw: u128 = dimms.iter().map(|dimm| u128::from(dimm.raw_capacity)).sum();
    Ok((raw * u128::from(percent) / 100) as u64)
}

/// Resolves one socket's request into capacity splits and templates
///
/// `templates` accumulates across sockets: an AppDirect request keeps an
/// existing two-template layout so a mixed-capacity socket processed first
/// still gets its asymmetric set.
pub fn resolve_templates(
    alignments: &Alignments,
    platform: &PlatformCapabilities,
    dimms: &[&Dimm],
    request: &TemplateRequest,
    templates: &mut Vec<RegionGoalTemplate>,
    status: &mut CommandStatus,
) -> Result<CapacitySplit> {
    if dimms.is_empty() {
        return Err(invalid_parameter("template resolution without modules"));
    }
    let count = dimms.len() as u64;
    let least = dimms.iter().map(|dimm| dimm.raw_capacity).min().unwrap_or(0);
    let total: u64 = dimms.iter().map(|dimm| dimm.raw_capacity).sum();
    let all_reserved = total == request.reserved_size;
    let volatile = request.volatile_size;
    let mut split = CapacitySplit::default();

    if total <= volatile {
        templates.clear();
        split.symmetrical = dimms
            .iter()
            .map(|dimm| RegionGoalDimm { dimm: dimm.id, region_size: 0, volatile_size: dimm.raw_capacity })
            .collect();
        split.volatile_actual = total;
    } else if volatile > 0 && request.pm_type == PersistentMemoryType::Storage {
        let per_dimm = calculate_actual_volatile_size(alignments, least, volatile / count);
        split.symmetrical = dimms
            .iter()
            .map(|dimm| RegionGoalDimm { dimm: dimm.id, region_size: 0, volatile_size: per_dimm })
            .collect();
        split.volatile_actual = per_dimm * count;
    } else {
        let symmetrical_size = round_down(least, alignments.volatile) * count;
        let mut per_dimm = calculate_actual_volatile_size(alignments, least, volatile / count);
        if per_dimm * count >= symmetrical_size {
            // leave one partition of persistent capacity on every module
            if least < alignments.partition {
                status.set(NvmStatusCode::OperationFailed);
                return Err(aborted("module smaller than the partition alignment"));
            }
            per_dimm = calculate_actual_volatile_size(alignments, least, least - alignments.partition);
        }

        if request.pm_type != PersistentMemoryType::Storage {
            split_persistent(alignments, dimms, request, per_dimm, all_reserved, &mut split, status)?;
        }

        if request.pm_type == PersistentMemoryType::Storage || split.symmetrical.is_empty() {
            split.symmetrical = dimms.iter().map(|dimm| RegionGoalDimm::new(dimm.id)).collect();
            templates.clear();
        } else if request.pm_type == PersistentMemoryType::AppDirectNotInterleaved {
            templates.clear();
            templates.push(RegionGoalTemplate { set_type: InterleaveSetType::NonInterleaved, asymmetrical: false });
        } else if templates.len() != 2 {
            templates.clear();
            templates.push(RegionGoalTemplate { set_type: InterleaveSetType::Interleaved, asymmetrical: false });
            if !split.asymmetrical.is_empty() {
                templates.push(RegionGoalTemplate { set_type: InterleaveSetType::NonInterleaved, asymmetrical: true });
            }
        }

        if volatile > 0 {
            split.volatile_actual = per_dimm * count;
        }
    }

    if volatile > 0 && !platform.memory_mode_allowed_by_bios {
        status.set_object_status(ObjectId::Socket(request.socket), NvmStatusCode::WarnImcDdrPmmNotPaired);
    }

    pmem_debug!(
        "Socket {}: {} symmetric, {} asymmetric, volatile {:#x}, {} templates",
        request.socket,
        split.symmetrical.len(),
        split.asymmetrical.len(),
        split.volatile_actual,
        templates.len()
    );
    Ok(split)
}

fn split_persistent(
    alignments: &Alignments,
    dimms: &[&Dimm],
    request: &TemplateRequest,
    volatile_per_dimm: u64,
    all_reserved: bool,
    split: &mut CapacitySplit,
    status: &mut CommandStatus,
) -> Result<()> {
    let available = |dimm: &Dimm| {
        round_down(dimm.raw_capacity.saturating_sub(volatile_per_dimm), alignments.persistent)
    };
    let least_persistent = dimms.iter().map(|dimm| available(dimm)).min().unwrap_or(0);

    for dimm in dimms {
        let persistent = available(dimm);
        if persistent == 0 {
            status.set(NvmStatusCode::PersMemMustBeAppliedToAllDimms);
            return Err(invalid_parameter("no persistent capacity left on a module"));
        }
        let region_size = match request.pm_type {
            PersistentMemoryType::AppDirectNotInterleaved => persistent,
            _ => least_persistent,
        };
        split.symmetrical.push(RegionGoalDimm {
            dimm: dimm.id,
            region_size,
            volatile_size: volatile_per_dimm,
        });
        if request.pm_type == PersistentMemoryType::AppDirect && persistent > least_persistent {
            split.asymmetrical.push(RegionGoalDimm {
                dimm: dimm.id,
                region_size: persistent - least_persistent,
                volatile_size: 0,
            });
        }
    }

    let mut reserved = request.reserved_size;
    if request.volatile_size == 0 {
        // alignment waste already counts toward the reservation
        for dimm in dimms {
            let unallocated = dimm.raw_capacity - round_down(dimm.raw_capacity, alignments.persistent);
            reserved = reserved.saturating_sub(unallocated);
        }
    }

    if reserved != 0 {
        pmem_info!("Socket {}: reserving {:#x} bytes of AppDirect capacity", request.socket, reserved);
        let reduced = tolerate_exhausted(reduce_app_direct(&mut reserved, &mut split.asymmetrical, alignments.persistent))
            .and_then(|_| {
                tolerate_exhausted(reduce_app_direct(&mut reserved, &mut split.symmetrical, alignments.persistent))
            });
        if let Err(err) = reduced {
            status.set(NvmStatusCode::OperationFailed);
            return Err(err);
        }
    }

    if request.volatile_size == 0 && !all_reserved && split.symmetrical.is_empty() {
        // everything got reserved although some AppDirect was asked for
        split.symmetrical = dimms
            .iter()
            .map(|dimm| RegionGoalDimm { dimm: dimm.id, region_size: alignments.persistent, volatile_size: 0 })
            .collect();
    }
    Ok(())
}

/// Trims a socket split to the platform's interleave set count limits
///
/// Capacity over the limit stays unmapped and a socket warning is attached;
/// this never fails.
pub fn apply_interleave_set_limits(
    limits: Option<MaxPmInterleaveSets>,
    pm_type: PersistentMemoryType,
    socket: SocketId,
    split: &mut CapacitySplit,
    status: &mut CommandStatus,
) {
    let Some(limits) = limits else {
        return;
    };
    let per_die = usize::from(limits.per_die);
    let object = ObjectId::Socket(socket);

    match pm_type {
        PersistentMemoryType::AppDirectNotInterleaved => {
            let carrying = split.symmetrical.iter().filter(|dimm| dimm.region_size > 0).count();
            if carrying > per_die {
                for dimm in split.symmetrical.iter_mut().filter(|dimm| dimm.region_size > 0).skip(per_die) {
                    dimm.region_size = 0;
                }
                status.set_object_status(object, NvmStatusCode::WarnMaxAdNiPmIsExceeded);
            }
        }
        PersistentMemoryType::AppDirect => {
            if split.asymmetrical.is_empty() {
                return;
            }
            if limits.per_dcpmm < 2 {
                split.asymmetrical.clear();
                status.set_object_status(object, NvmStatusCode::WarnMaxAdPmIsExceeded);
            } else if 1 + split.asymmetrical.len() > per_die {
                split.asymmetrical.truncate(per_die.saturating_sub(1));
                status.set_object_status(object, NvmStatusCode::WarnAdNiPmIsReduced);
            }
        }
        PersistentMemoryType::Storage => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::DimmLocation;
    use alloc::vec;
    use pmem_api::{DimmId, DimmUid, GIB};

    fn module(id: u32, channel: u8, gib: u64) -> Dimm {
        let location = DimmLocation { socket: SocketId(0), imc: 0, channel, channel_position: 0 };
        Dimm::new(DimmId(id), DimmUid::default(), location, gib * GIB)
    }

    fn request(volatile: u64, pm_type: PersistentMemoryType) -> TemplateRequest {
        TemplateRequest { socket: SocketId(0), volatile_size: volatile, pm_type, reserved_size: 0 }
    }

    #[test]
    fn test_actual_volatile_size() {
        let alignments = Alignments::default();
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 0), 0);
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 256 * GIB), 128 * GIB);
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 32 * GIB), 32 * GIB);
        // tiny request still yields a full partition of volatile
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 1), 32 * GIB);
    }

    #[test]
    fn test_actual_volatile_rounds_persistent_half_up() {
        let alignments = Alignments::default();
        // 128 - 10 = 118 GiB persistent, 118 % 32 = 22 > 16, round up to 128
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 10 * GIB), 32 * GIB);
        // 128 - 20 = 108 GiB persistent, 108 % 32 = 12, round down to 96
        assert_eq!(calculate_actual_volatile_size(&alignments, 128 * GIB, 20 * GIB), 32 * GIB);
    }

    #[test]
    fn test_capacity_from_percent() {
        let dimms = [module(1, 0, 128), module(2, 1, 128)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        assert_eq!(calculate_dimm_capacity_from_percent(&refs, 25).unwrap(), 64 * GIB);
        assert!(calculate_dimm_capacity_from_percent(&refs, 101).is_err());
    }

    #[test]
    fn test_all_volatile() {
        let dimms = [module(1, 0, 128), module(2, 1, 128)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        let mut templates = Vec::new();
        let mut status = CommandStatus::new();
        let split = resolve_templates(
            &Alignments::default(),
            &PlatformCapabilities::default(),
            &refs,
            &request(256 * GIB, PersistentMemoryType::AppDirect),
            &mut templates,
            &mut status,
        )
        .unwrap();
        assert!(templates.is_empty());
        assert_eq!(split.volatile_actual, 256 * GIB);
        assert!(split.symmetrical.iter().all(|d| d.volatile_size == 128 * GIB && d.region_size == 0));
    }

    #[test]
    fn test_mixed_capacity_app_direct() {
        let dimms = [module(1, 0, 128), module(2, 1, 256)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        let mut templates = Vec::new();
        let mut status = CommandStatus::new();
        let split = resolve_templates(
            &Alignments::default(),
            &PlatformCapabilities::default(),
            &refs,
            &request(0, PersistentMemoryType::AppDirect),
            &mut templates,
            &mut status,
        )
        .unwrap();
        assert_eq!(templates.len(), 2);
        assert!(templates[1].asymmetrical);
        assert!(split.symmetrical.iter().all(|d| d.region_size == 128 * GIB));
        assert_eq!(split.asymmetrical, vec![RegionGoalDimm { dimm: DimmId(2), region_size: 128 * GIB, volatile_size: 0 }]);
    }

    #[test]
    fn test_reserved_takes_asymmetric_first() {
        let dimms = [module(1, 0, 128), module(2, 1, 256)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        let mut templates = Vec::new();
        let mut status = CommandStatus::new();
        let mut req = request(0, PersistentMemoryType::AppDirect);
        req.reserved_size = 128 * GIB;
        let split = resolve_templates(
            &Alignments::default(),
            &PlatformCapabilities::default(),
            &refs,
            &req,
            &mut templates,
            &mut status,
        )
        .unwrap();
        assert!(split.asymmetrical.is_empty());
        assert_eq!(templates.len(), 1);
        assert_eq!(split.persistent_total(), 256 * GIB);
    }

    #[test]
    fn test_storage_leaves_everything_unmapped() {
        let dimms = [module(1, 0, 128), module(2, 1, 128)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        let mut templates = vec![RegionGoalTemplate { set_type: InterleaveSetType::Interleaved, asymmetrical: false }];
        let mut status = CommandStatus::new();
        let split = resolve_templates(
            &Alignments::default(),
            &PlatformCapabilities::default(),
            &refs,
            &request(0, PersistentMemoryType::Storage),
            &mut templates,
            &mut status,
        )
        .unwrap();
        assert!(templates.is_empty());
        assert_eq!(split.persistent_total(), 0);
        assert_eq!(split.symmetrical.len(), 2);
    }

    #[test]
    fn test_bios_memory_mode_warning() {
        let dimms = [module(1, 0, 128)];
        let refs: Vec<&Dimm> = dimms.iter().collect();
        let mut platform = PlatformCapabilities::default();
        platform.memory_mode_allowed_by_bios = false;
        let mut templates = Vec::new();
        let mut status = CommandStatus::new();
        resolve_templates(
            &Alignments::default(),
            &platform,
            &refs,
            &request(32 * GIB, PersistentMemoryType::AppDirect),
            &mut templates,
            &mut status,
        )
        .unwrap();
        assert!(status.contains(NvmStatusCode::WarnImcDdrPmmNotPaired));
    }

    #[test]
    fn test_interleave_set_limits() {
        let mut split = CapacitySplit {
            symmetrical: vec![RegionGoalDimm { dimm: DimmId(1), region_size: GIB, volatile_size: 0 }],
            asymmetrical: vec![
                RegionGoalDimm { dimm: DimmId(2), region_size: GIB, volatile_size: 0 },
                RegionGoalDimm { dimm: DimmId(3), region_size: GIB, volatile_size: 0 },
            ],
            volatile_actual: 0,
        };
        let mut status = CommandStatus::new();
        let limits = MaxPmInterleaveSets { per_die: 2, per_dcpmm: 2 };
        apply_interleave_set_limits(Some(limits), PersistentMemoryType::AppDirect, SocketId(0), &mut split, &mut status);
        assert_eq!(split.asymmetrical.len(), 1);
        assert!(status.contains(NvmStatusCode::WarnAdNiPmIsReduced));

        let limits = MaxPmInterleaveSets { per_die: 2, per_dcpmm: 1 };
        apply_interleave_set_limits(Some(limits), PersistentMemoryType::AppDirect, SocketId(0), &mut split, &mut status);
        assert!(split.asymmetrical.is_empty());
        assert!(!status.has_errors());
    }
}
