//! Interleave sets currently configured on the platform

use alloc::vec::Vec;

use pmem_api::{DimmId, SocketId};

use crate::dimm::DimmInventory;
use crate::platform::{ChannelWays, InterleaveSize};

/// Health of a reconstructed interleave set, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum IsState {
    /// Every member present and mapped
    #[default]
    Healthy = 0,
    /// No SPA range maps the set
    SpaMissing = 1,
    /// A member's current config was not applied
    ConfigInactive = 2,
    /// A member module is absent
    DimmMissing = 3,
    /// Set could not be initialised
    InitFailure = 4,
}

impl IsState {
    /// The more severe of two states
    #[must_use]
    pub fn promote(self, other: IsState) -> IsState {
        self.max(other)
    }
}

/// One module's contribution to an interleave set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimmRegion {
    /// Member module
    pub dimm: DimmId,
    /// Offset of the persistent partition on the module
    pub partition_offset: u64,
    /// Size of the region in bytes
    pub partition_size: u64,
    /// Offset inside the system physical address range
    pub spa_offset: u64,
}

/// Interleave format of a configured set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetFormat {
    /// Interleave width
    pub channel_ways: ChannelWays,
    /// iMC interleave granularity
    pub imc_interleaving: InterleaveSize,
    /// Channel interleave granularity
    pub channel_interleaving: InterleaveSize,
}

/// A configured interleave set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveSet {
    /// System-wide interleave set index
    pub index: u16,
    /// Socket the members live on
    pub socket: SocketId,
    /// Total size across members
    pub size: u64,
    state: IsState,
    /// Interleave format
    pub format: SetFormat,
    /// Set is mirrored
    pub mirrored: bool,
    /// Index of the NFIT SPA range backing the set, when known
    pub spa_range_index: Option<u16>,
    /// Member regions
    pub dimm_regions: Vec<DimmRegion>,
    /// Integrity cookie over module identity and SPA layout
    pub cookie: u64,
}

impl InterleaveSet {
    /// Healthy empty set
    pub fn new(index: u16, socket: SocketId) -> Self {
        Self {
            index,
            socket,
            size: 0,
            state: IsState::Healthy,
            format: SetFormat::default(),
            mirrored: false,
            spa_range_index: None,
            dimm_regions: Vec::new(),
            cookie: 0,
        }
    }

    /// Current health
    pub fn state(&self) -> IsState {
        self.state
    }

    /// Raises the health state; a less severe state is ignored
    pub fn promote_state(&mut self, state: IsState) {
        self.state = self.state.promote(state);
    }

    /// Number of member modules
    pub fn dimms_num(&self) -> usize {
        self.dimm_regions.len()
    }

    /// Whether the module contributes a region
    pub fn contains(&self, dimm: DimmId) -> bool {
        self.dimm_regions.iter().any(|region| region.dimm == dimm)
    }

    /// Adds a module's region and grows the set
    pub fn push_region(&mut self, region: DimmRegion) {
        self.size = self.size.saturating_add(region.partition_size);
        self.dimm_regions.push(region);
    }

    /// Orders regions by partition offset, then SPA offset
    pub fn sort_regions(&mut self) {
        self.dimm_regions
            .sort_by_key(|region| (region.partition_offset, region.spa_offset));
    }
}

/// AppDirect flavour of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionType {
    /// Interleaved across several modules
    AppDirect,
    /// Single module
    AppDirectNotInterleaved,
}

/// User-facing region health
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionHealth {
    /// Healthy and unlocked
    Normal,
    /// A member module is security locked
    Locked,
    /// A goal is waiting for the next reboot
    Pending,
    /// Set is degraded
    Error,
}

/// Region type implied by the member count
pub fn determine_region_type(set: &InterleaveSet) -> RegionType {
    if set.dimms_num() > 1 {
        RegionType::AppDirect
    } else {
        RegionType::AppDirectNotInterleaved
    }
}

/// Locked beats pending beats error
pub fn determine_region_health(set: &InterleaveSet, inventory: &DimmInventory) -> RegionHealth {
    let members = || set.dimm_regions.iter().filter_map(|region| inventory.get(region.dimm));
    if members().any(|dimm| dimm.is_locked()) {
        RegionHealth::Locked
    } else if members().any(|dimm| dimm.has_new_goal()) {
        RegionHealth::Pending
    } else if set.state() != IsState::Healthy {
        RegionHealth::Error
    } else {
        RegionHealth::Normal
    }
}

/// Capacity not yet claimed by namespaces
pub fn free_capacity(set: &InterleaveSet, namespace_usage: u64) -> u64 {
    set.size.saturating_sub(namespace_usage)
}
