//! Module inventory
//!
//! The inventory is owned by the caller's session. The engine reads module
//! identity and topology and writes only the goal and current-config
//! bookkeeping on each [`Dimm`].

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

use pmem_api::collections::HashMap;
use pmem_api::{
    DimmId, DimmUid, Error, Result, SocketId, MAX_DIMMS, MAX_DIMMS_PER_SOCKET, MAX_IS_PER_DIMM,
    pmem_warn,
};

use crate::goal::GoalHandle;
use crate::pcd::DimmConfigStatus;

bitflags::bitflags! {
    /// Modes the module SKU enables
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SkuCapabilities: u8 {
        /// Module may provide volatile far memory
        const MEMORY_MODE = 0b0000_0001;
        /// Module may provide AppDirect capacity
        const APP_DIRECT_MODE = 0b0000_0010;
    }
}

/// Status of the pending goal on a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[derive(Default)]
pub enum GoalConfigStatus {
    /// No goal, or the last goal was applied
    #[default]
    NoGoalOrSuccess = 0,
    /// Status could not be determined
    Unknown = 1,
    /// Goal is waiting for the next reboot
    New = 2,
    /// Firmware rejected the request as malformed
    BadRequest = 3,
    /// Platform lacked resources to apply the goal
    NotEnoughResources = 4,
    /// Firmware failed while applying the goal
    FirmwareError = 5,
    /// Goal failed for an unrecognised reason
    FailedUnknown = 6,
}

/// Physical position of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DimmLocation {
    /// Socket the module is populated on
    pub socket: SocketId,
    /// Memory controller within the socket
    pub imc: u8,
    /// Channel within the memory controller
    pub channel: u8,
    /// Slot within the channel
    pub channel_position: u8,
}

/// Current configuration as reported by platform config data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DimmConfigState {
    /// Status of the current config record
    pub status: DimmConfigStatus,
    /// Current config was applied, possibly from an older input
    pub configured: bool,
    /// Module was added since the last configuration
    pub is_new: bool,
    /// Volatile bytes mapped at the last boot
    pub mapped_volatile_capacity: u64,
    /// Persistent bytes mapped at the last boot
    pub mapped_persistent_capacity: u64,
    /// Indices of the interleave sets the module contributes to
    pub interleave_sets: Vec<u16>,
}

/// Pending goal bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimmGoalState {
    /// Goals indexed by sequence index
    pub goals: Vec<Option<GoalHandle>>,
    /// Module takes part in a goal request
    pub regions_goal_config: bool,
    /// Volatile bytes the pending goal requests
    pub volatile_size_goal: u64,
    /// Progress of the pending goal
    pub status: GoalConfigStatus,
    /// In-memory goal matches what was written to the module
    pub pcd_synced: bool,
}

impl Default for DimmGoalState {
    fn default() -> Self {
        Self {
            goals: Vec::new(),
            regions_goal_config: false,
            volatile_size_goal: 0,
            status: GoalConfigStatus::NoGoalOrSuccess,
            pcd_synced: true,
        }
    }
}

impl DimmGoalState {
    /// Drops every goal reference, keeping the flags
    pub fn clear_goals(&mut self) {
        self.goals.clear();
    }

    /// Forgets the goal request entirely
    pub fn reset(&mut self) {
        self.goals.clear();
        self.regions_goal_config = false;
        self.volatile_size_goal = 0;
    }
}

/// A persistent memory module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimm {
    /// Inventory handle
    pub id: DimmId,
    /// Unique identity as reported by the module
    pub uid: DimmUid,
    /// Physical position
    pub location: DimmLocation,
    /// Raw capacity in bytes
    pub raw_capacity: u64,
    /// Device physical address where the persistent partition starts
    pub pm_start: u64,
    /// Modes the module SKU enables
    pub sku: SkuCapabilities,
    /// Module can be configured by this engine
    pub manageable: bool,
    /// Module responds to management commands
    pub functional: bool,
    /// Security state prevents configuration changes
    pub security_locked: bool,
    /// Current configuration
    pub config: DimmConfigState,
    /// Pending goal bookkeeping
    pub goal: DimmGoalState,
}

impl Dimm {
    /// A manageable, functional module with both modes enabled
    pub fn new(id: DimmId, uid: DimmUid, location: DimmLocation, raw_capacity: u64) -> Self {
        Self {
            id,
            uid,
            location,
            raw_capacity,
            pm_start: 0,
            sku: SkuCapabilities::MEMORY_MODE | SkuCapabilities::APP_DIRECT_MODE,
            manageable: true,
            functional: true,
            security_locked: false,
            config: DimmConfigState::default(),
            goal: DimmGoalState::default(),
        }
    }

    /// Replaces the SKU capabilities
    pub fn with_sku(mut self, sku: SkuCapabilities) -> Self {
        self.sku = sku;
        self
    }

    /// Sets where the persistent partition starts
    pub fn with_pm_start(mut self, pm_start: u64) -> Self {
        self.pm_start = pm_start;
        self
    }

    /// Sets whether the engine may configure the module
    pub fn with_manageable(mut self, manageable: bool) -> Self {
        self.manageable = manageable;
        self
    }

    /// Socket the module is populated on
    pub fn socket(&self) -> SocketId {
        self.location.socket
    }

    /// Number of goal slots in use, including empty slots below the highest one
    pub fn goal_count(&self) -> usize {
        self.goal.goals.len()
    }

    /// Live goal handles in sequence order
    pub fn goal_handles(&self) -> impl Iterator<Item = GoalHandle> + '_ {
        self.goal.goals.iter().flatten().copied()
    }

    /// Whether any goal slot is taken
    pub fn has_goals(&self) -> bool {
        self.goal.goals.iter().any(Option::is_some)
    }

    /// Stores a goal at its sequence index
    pub fn set_goal(&mut self, sequence_index: u16, handle: GoalHandle) -> Result<()> {
        let slot = usize::from(sequence_index);
        if slot >= MAX_IS_PER_DIMM {
            pmem_warn!("DIMM {}: goal sequence index {} out of range", self.id, sequence_index);
            return Err(Error::Aborted("goal sequence index exceeds per-DIMM limit".into()));
        }
        if self.goal.goals.len() <= slot {
            self.goal.goals.resize(slot + 1, None);
        }
        self.goal.goals[slot] = Some(handle);
        Ok(())
    }

    /// Whether a new goal is pending on the module
    pub fn has_new_goal(&self) -> bool {
        self.goal.status == GoalConfigStatus::New
    }

    /// Whether security blocks configuration changes
    pub fn is_locked(&self) -> bool {
        self.security_locked
    }

    /// Whether the current config was applied successfully
    pub fn config_succeeded(&self) -> bool {
        self.config.status == DimmConfigStatus::Success
    }
}

/// Ordered set of modules with lookup by id
#[derive(Debug, Clone, Default)]
pub struct DimmInventory {
    dimms: Vec<Dimm>,
    index: HashMap<DimmId, usize>,
}

impl DimmInventory {
    /// Builds the inventory, rejecting duplicates and over-populated platforms
    pub fn new(dimms: Vec<Dimm>) -> Result<Self> {
        if dimms.len() > MAX_DIMMS {
            return Err(Error::Aborted("more modules than the platform supports".into()));
        }
        let mut index = HashMap::with_capacity(dimms.len());
        let mut per_socket: HashMap<SocketId, usize> = HashMap::new();
        for (position, dimm) in dimms.iter().enumerate() {
            if index.insert(dimm.id, position).is_some() {
                return Err(Error::InvalidParameter("duplicate module id".into()));
            }
            let count = per_socket.entry(dimm.socket()).or_insert(0);
            *count += 1;
            if *count > MAX_DIMMS_PER_SOCKET {
                return Err(Error::Aborted("more modules on a socket than supported".into()));
            }
        }
        Ok(Self { dimms, index })
    }

    /// Number of modules
    pub fn len(&self) -> usize {
        self.dimms.len()
    }

    /// Whether the inventory holds no modules
    pub fn is_empty(&self) -> bool {
        self.dimms.is_empty()
    }

    /// Module by id
    pub fn get(&self, id: DimmId) -> Option<&Dimm> {
        self.index.get(&id).map(|position| &self.dimms[*position])
    }

    /// Mutable module by id
    pub fn get_mut(&mut self, id: DimmId) -> Option<&mut Dimm> {
        match self.index.get(&id) {
            Some(position) => self.dimms.get_mut(*position),
            None => None,
        }
    }

    /// Module by id or `NotFound`
    pub fn require(&self, id: DimmId) -> Result<&Dimm> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(alloc::format!("module {} not in inventory", id)))
    }

    /// Mutable module by id or `NotFound`
    pub fn require_mut(&mut self, id: DimmId) -> Result<&mut Dimm> {
        self.get_mut(id)
            .ok_or_else(|| Error::NotFound(alloc::format!("module {} not in inventory", id)))
    }

    /// Modules in population order
    pub fn iter(&self) -> impl Iterator<Item = &Dimm> {
        self.dimms.iter()
    }

    /// Mutable modules in population order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Dimm> {
        self.dimms.iter_mut()
    }

    /// Modules the engine may configure
    pub fn manageable(&self) -> impl Iterator<Item = &Dimm> {
        self.dimms.iter().filter(|dimm| dimm.manageable)
    }

    /// Manageable modules on a socket
    pub fn manageable_on_socket(&self, socket: SocketId) -> impl Iterator<Item = &Dimm> {
        self.manageable().filter(move |dimm| dimm.socket() == socket)
    }

    /// Sockets that host at least one module, ascending
    pub fn sockets(&self) -> BTreeSet<SocketId> {
        self.dimms.iter().map(Dimm::socket).collect()
    }

    /// Module matching a vendor and serial number
    pub fn find_by_serial(&self, vendor_id: u16, serial_number: u32) -> Option<&Dimm> {
        self.dimms
            .iter()
            .find(|dimm| dimm.uid.vendor_id == vendor_id && dimm.uid.serial_number == serial_number)
    }

    /// Module matching a full unique id
    pub fn find_by_uid(&self, uid: &DimmUid) -> Option<&Dimm> {
        self.dimms.iter().find(|dimm| dimm.uid == *uid)
    }

    /// Ids in inventory order
    pub fn ids(&self) -> Vec<DimmId> {
        self.dimms.iter().map(|dimm| dimm.id).collect()
    }

    /// Clears goal bookkeeping on every module
    pub fn reset_goal_state(&mut self) {
        for dimm in self.dimms.iter_mut() {
            dimm.goal = DimmGoalState {
                pcd_synced: false,
                ..DimmGoalState::default()
            };
        }
    }
}
