//! Current-state reconstruction
//!
//! Rebuilds the interleave sets the platform is running with. Two sources
//! describe the same layout:
//!
//! - the current config in each module's PCD, which names members by
//!   identity and partition offset ([`reconstruct_from_pcd`])
//! - the NFIT region mapping structures, which name members by handle and
//!   device physical address ([`reconstruct_from_nfit`])
//!
//! The PCD path borrows SPA offsets from the NFIT snapshot. Both paths
//! yield sets sorted by index with regions sorted by partition offset, and
//! [`check_reconstruction_consistency`] cross-checks them.
//!
//! A set's health only ever degrades while it is being built, see
//! [`IsState::promote`].

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use pmem_api::{
    CommandStatus, DimmId, MAX_IS_PER_DIMM, NvmStatusCode, ObjectId, Result, SocketId,
    device_error, pmem_debug, pmem_error, pmem_warn,
};

use crate::config::LabelVersion;
use crate::dimm::DimmInventory;
use crate::pcd::{DimmConfigStatus, InterleaveInformation, PcatTable, PlatformConfigSource};
use crate::region::{DimmRegion, InterleaveSet, IsState, SetFormat};

/// Address range type of an NFIT SPA range structure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaRangeKind {
    /// Byte-addressable persistent memory
    PersistentMemory,
    /// Volatile memory
    Volatile,
    /// Any other address range type GUID
    Other,
}

/// System physical address range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaRange {
    /// SPA range structure index, referenced by region mappings
    pub index: u16,
    /// Address range type
    pub kind: SpaRangeKind,
    /// First system physical address of the range
    pub base: u64,
    /// Length of the range in bytes
    pub length: u64,
}

/// Part of a module mapped into a SPA range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionMapping {
    /// Module the region lives on
    pub dimm: DimmId,
    /// SPA range the region is mapped into
    pub spa_range_index: u16,
    /// Offset of the module's first byte inside the SPA range
    pub region_offset: u64,
    /// Device physical address of the mapped region
    pub dpa: u64,
    /// Length of the mapped region in bytes
    pub length: u64,
    /// Number of modules interleaved in the SPA range
    pub interleave_ways: u16,
}

/// Decoded NFIT snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfitTables {
    /// SPA range structures
    pub spa_ranges: Vec<SpaRange>,
    /// Memory device to SPA range mapping structures
    pub region_mappings: Vec<RegionMapping>,
}

impl NfitTables {
    /// Empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Mappings that belong to a SPA range
    pub fn mappings_for(&self, spa_range_index: u16) -> impl Iterator<Item = &RegionMapping> {
        self.region_mappings
            .iter()
            .filter(move |mapping| mapping.spa_range_index == spa_range_index)
    }

    /// SPA range whose mappings are exactly the set's regions
    ///
    /// Returns the range index and the SPA offset of each region, in region
    /// order. A mapping matches a region when it names the same module,
    /// starts at the region's device address and has the same length.
    pub fn match_set(&self, set: &InterleaveSet, inventory: &DimmInventory) -> Option<(u16, Vec<u64>)> {
        if set.dimm_regions.is_empty() {
            return None;
        }
        'ranges: for range in &self.spa_ranges {
            let mut offsets = alloc::vec![None; set.dimm_regions.len()];
            let mut matched = 0usize;
            for mapping in self.mappings_for(range.index) {
                let Some(position) = set.dimm_regions.iter().position(|region| region.dimm == mapping.dimm) else {
                    continue 'ranges;
                };
                let region = &set.dimm_regions[position];
                let pm_start = inventory.get(region.dimm).map_or(0, |dimm| dimm.pm_start);
                let same_offset = pm_start + region.partition_offset == mapping.dpa;
                if !same_offset || region.partition_size != mapping.length {
                    continue 'ranges;
                }
                if offsets[position].is_none() {
                    matched += 1;
                }
                offsets[position] = Some(mapping.region_offset);
            }
            if matched == set.dimm_regions.len() {
                return Some((range.index, offsets.into_iter().flatten().collect()));
            }
        }
        None
    }
}

/// Fletcher-64 over little-endian 32-bit words
///
/// Trailing bytes that do not fill a word are ignored.
pub fn fletcher64(data: &[u8]) -> u64 {
    let mut lo: u32 = 0;
    let mut hi: u32 = 0;
    for word in data.chunks_exact(4) {
        lo = lo.wrapping_add(u32::from_le_bytes([word[0], word[1], word[2], word[3]]));
        hi = hi.wrapping_add(lo);
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

const COOKIE_RECORD_V1_1: usize = 16;
const COOKIE_RECORD_V1_2: usize = 48;

/// Interleave-set cookie for the given label version
///
/// One record per region, ordered by SPA offset. A v1.2 record carries the
/// SPA offset, serial number, vendor id, manufacturing date and location;
/// a v1.1 record only the SPA offset and serial number.
pub fn interleave_set_cookie(set: &InterleaveSet, inventory: &DimmInventory, version: LabelVersion) -> Result<u64> {
    let mut regions: Vec<&DimmRegion> = set.dimm_regions.iter().collect();
    regions.sort_by_key(|region| region.spa_offset);

    let record_len = match version {
        LabelVersion::V1_1 => COOKIE_RECORD_V1_1,
        LabelVersion::V1_2 => COOKIE_RECORD_V1_2,
    };
    let mut data = Vec::with_capacity(regions.len() * record_len);
    for region in regions {
        let uid = inventory.require(region.dimm)?.uid;
        let start = data.len();
        data.extend_from_slice(&region.spa_offset.to_le_bytes());
        data.extend_from_slice(&uid.serial_number.to_le_bytes());
        if version == LabelVersion::V1_2 {
            data.extend_from_slice(&uid.vendor_id.to_le_bytes());
            data.extend_from_slice(&uid.manufacturing_date.to_le_bytes());
            data.push(uid.manufacturing_location);
        }
        data.resize(start + record_len, 0);
    }
    Ok(fletcher64(&data))
}

/// Completes a set once its members are known: SPA offsets, cookie, order
fn finish_set(set: &mut InterleaveSet, inventory: &DimmInventory, nfit: &NfitTables, version: LabelVersion) {
    match nfit.match_set(set, inventory) {
        Some((range_index, offsets)) => {
            set.spa_range_index = Some(range_index);
            for (region, offset) in set.dimm_regions.iter_mut().zip(offsets) {
                region.spa_offset = offset;
            }
        }
        None => {
            pmem_debug!("IS {}: no SPA range matches its regions", set.index);
            set.promote_state(IsState::SpaMissing);
        }
    }

    set.cookie = if set.spa_range_index.is_some() {
        match interleave_set_cookie(set, inventory, version) {
            Ok(cookie) => cookie,
            Err(_) => {
                set.promote_state(IsState::InitFailure);
                0
            }
        }
    } else {
        0
    };
    set.sort_regions();
}

/// Builds the set described by one interleave information table
fn set_from_interleave_information(
    inventory: &mut DimmInventory,
    info: &InterleaveInformation,
    socket: SocketId,
) -> InterleaveSet {
    let mut set = InterleaveSet::new(info.interleave_set_index, socket);
    set.format = SetFormat {
        channel_ways: info.channel_ways,
        imc_interleaving: info.imc_interleaving,
        channel_interleaving: info.channel_interleaving,
    };
    set.mirrored = info.mirror;

    for identification in &info.identifications {
        if !identification.dimm.is_complete() {
            pmem_error!("IS {}: member without vendor or serial number", info.interleave_set_index);
            set.promote_state(IsState::InitFailure);
            continue;
        }
        let Some(member) = identification.dimm.resolve(inventory).map(|dimm| dimm.id) else {
            pmem_debug!("IS {}: member module not present", info.interleave_set_index);
            set.promote_state(IsState::DimmMissing);
            continue;
        };
        set.push_region(DimmRegion {
            dimm: member,
            partition_offset: identification.partition_offset,
            partition_size: identification.partition_size,
            spa_offset: 0,
        });

        if let Some(dimm) = inventory.get_mut(member) {
            let sets = &mut dimm.config.interleave_sets;
            if !sets.contains(&set.index) {
                if sets.len() < MAX_IS_PER_DIMM {
                    sets.push(set.index);
                } else {
                    pmem_error!("DIMM {}: more interleave sets than supported", member);
                    set.promote_state(IsState::InitFailure);
                }
            }
        }
    }

    if set.dimms_num() < usize::from(info.num_dimms) {
        set.promote_state(IsState::DimmMissing);
    }
    set
}

/// Reconstructs interleave sets from the current config of every module
///
/// A module whose PCD cannot be read, or whose current config carries a
/// table the engine does not know, is recorded in `status` and skipped.
/// Sets are created by the first module that describes them. Sets that
/// include a module whose current config was not applied are marked
/// [`IsState::ConfigInactive`].
pub fn reconstruct_from_pcd<S: PlatformConfigSource + ?Sized>(
    inventory: &mut DimmInventory,
    source: &S,
    nfit: &NfitTables,
    label_version: LabelVersion,
    status: &mut CommandStatus,
) -> Result<Vec<InterleaveSet>> {
    let ids: Vec<DimmId> = inventory.manageable().map(|dimm| dimm.id).collect();
    for id in &ids {
        inventory.require_mut(*id)?.config.interleave_sets.clear();
    }

    let mut sets: Vec<InterleaveSet> = Vec::new();
    let mut inactive: Vec<DimmId> = Vec::new();

    for id in ids {
        let data = match source.platform_config(id) {
            Ok(Some(data)) => data,
            Ok(None) => continue,
            Err(err) => {
                pmem_error!("DIMM {}: unable to read platform config data: {}", id, err);
                status.set_object_status(ObjectId::Dimm(id), NvmStatusCode::GetPcdFailed);
                continue;
            }
        };
        let Some(current) = data.current else {
            continue;
        };

        let socket = {
            let dimm = inventory.require_mut(id)?;
            dimm.config.status = current.status;
            dimm.config.configured =
                matches!(current.status, DimmConfigStatus::Success | DimmConfigStatus::OldConfigUsed);
            dimm.config.is_new = current.status == DimmConfigStatus::NewDimm;
            dimm.config.mapped_volatile_capacity = current.volatile_memory_size;
            dimm.config.mapped_persistent_capacity = current.persistent_memory_size;
            if current.status != DimmConfigStatus::Success {
                inactive.push(id);
            }
            dimm.socket()
        };

        for table in &current.tables {
            match table {
                PcatTable::InterleaveInformation(info) => {
                    if sets.iter().any(|set| set.index == info.interleave_set_index) {
                        continue;
                    }
                    let mut set = set_from_interleave_information(inventory, info, socket);
                    finish_set(&mut set, inventory, nfit, label_version);
                    sets.push(set);
                }
                PcatTable::PartitionSizeChange(_) | PcatTable::ConfigManagementAttributes => {}
                PcatTable::Unknown(kind) => {
                    pmem_error!("DIMM {}: unknown current config table type {}", id, kind);
                    status.set_object_status(ObjectId::Dimm(id), NvmStatusCode::DeviceError);
                    break;
                }
            }
        }
    }

    for set in sets.iter_mut() {
        if inactive.iter().any(|id| set.contains(*id)) {
            set.promote_state(IsState::ConfigInactive);
        }
    }
    sets.sort_by_key(|set| set.index);
    Ok(sets)
}

/// Reconstructs interleave sets from NFIT region mappings
///
/// Every persistent-memory SPA range with at least one mapping becomes a
/// set whose index is the SPA range index. Mappings naming modules that are
/// not in the inventory leave the set [`IsState::DimmMissing`].
pub fn reconstruct_from_nfit(
    inventory: &DimmInventory,
    nfit: &NfitTables,
    label_version: LabelVersion,
) -> Vec<InterleaveSet> {
    let mut sets = Vec::new();
    for range in nfit.spa_ranges.iter().filter(|range| range.kind == SpaRangeKind::PersistentMemory) {
        let mappings: Vec<&RegionMapping> = nfit.mappings_for(range.index).collect();
        if mappings.is_empty() {
            continue;
        }
        let socket = mappings
            .iter()
            .find_map(|mapping| inventory.get(mapping.dimm))
            .map_or(SocketId::default(), |dimm| dimm.socket());

        let mut set = InterleaveSet::new(range.index, socket);
        set.spa_range_index = Some(range.index);
        let mut ways = 0usize;
        for mapping in &mappings {
            ways = ways.max(usize::from(mapping.interleave_ways));
            match inventory.get(mapping.dimm) {
                Some(dimm) => set.push_region(DimmRegion {
                    dimm: dimm.id,
                    partition_offset: mapping.dpa.saturating_sub(dimm.pm_start),
                    partition_size: mapping.length,
                    spa_offset: mapping.region_offset,
                }),
                None => {
                    pmem_debug!("SPA range {}: mapping for unknown DIMM {}", range.index, mapping.dimm);
                    set.promote_state(IsState::DimmMissing);
                }
            }
        }
        if set.dimms_num() < ways {
            set.promote_state(IsState::DimmMissing);
        }

        set.cookie = match interleave_set_cookie(&set, inventory, label_version) {
            Ok(cookie) => cookie,
            Err(_) => {
                set.promote_state(IsState::InitFailure);
                0
            }
        };
        set.sort_regions();
        sets.push(set);
    }
    sets.sort_by_key(|set| set.index);
    sets
}

fn region_sizes<'a>(sets: impl Iterator<Item = &'a InterleaveSet>) -> BTreeMap<(DimmId, u64), u64> {
    sets.flat_map(|set| set.dimm_regions.iter())
        .map(|region| ((region.dimm, region.partition_offset), region.partition_size))
        .collect()
}

/// Checks that both paths describe the same module regions
///
/// Only PCD sets backed by a SPA range take part; the NFIT cannot describe
/// the others. NFIT regions of modules that are not manageable are skipped
/// since their PCD is never read.
pub fn check_reconstruction_consistency(
    inventory: &DimmInventory,
    pcd_sets: &[InterleaveSet],
    nfit_sets: &[InterleaveSet],
) -> Result<()> {
    let from_pcd = region_sizes(pcd_sets.iter().filter(|set| set.spa_range_index.is_some()));
    let mut from_nfit = region_sizes(nfit_sets.iter());
    from_nfit.retain(|(dimm, _), _| inventory.get(*dimm).is_some_and(|dimm| dimm.manageable));
    if from_pcd != from_nfit {
        pmem_warn!(
            "current config describes {} regions, NFIT describes {}",
            from_pcd.len(),
            from_nfit.len()
        );
        return Err(device_error("current config and NFIT region layouts differ"));
    }
    Ok(())
}
