//! Region goals
//!
//! Goals live in a [`GoalArena`] and modules refer to them through
//! generational [`GoalHandle`]s, so a freed goal can never be reached
//! through a stale handle. New goals are staged in a [`GoalChangeset`] and
//! only become visible to modules when the changeset commits.

use alloc::vec::Vec;

use pmem_api::{DimmId, Error, Result, MAX_IS_CONFIGS, MAX_IS_PER_DIMM, pmem_trace, pmem_warn};

use static_assertions::const_assert;

use crate::dimm::{Dimm, DimmInventory, GoalConfigStatus};
use crate::platform::{ChannelWays, InterleaveSize};
use crate::region::InterleaveSet;

// goal slots are addressed by a u16 sequence index
const_assert!(MAX_IS_PER_DIMM <= u16::MAX as usize);

/// Kind of interleave set a goal requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum InterleaveSetType {
    /// Resolved to interleaved during platform verification
    #[default]
    Default = 0,
    /// Interleaved across several modules
    Interleaved = 1,
    /// One goal per module
    NonInterleaved = 2,
    /// Mirrored across a module pair
    Mirrored = 3,
}

/// A planned interleave set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGoal {
    /// Position among each participating module's goals
    pub sequence_index: u16,
    /// Total size across all modules
    pub size: u64,
    /// Kind of interleave set
    pub set_type: InterleaveSetType,
    /// iMC interleave granularity
    pub imc_interleaving: InterleaveSize,
    /// Channel interleave granularity
    pub channel_interleaving: InterleaveSize,
    /// Interleave width
    pub channel_ways: ChannelWays,
    /// System-wide unique index
    pub interleave_set_index: u16,
    /// Member modules in slot order
    pub dimms: Vec<DimmId>,
}

impl RegionGoal {
    /// Number of member modules
    pub fn dimms_num(&self) -> usize {
        self.dimms.len()
    }

    /// Share of the goal carried by each module
    pub fn size_per_dimm(&self) -> u64 {
        match self.dimms.len() {
            0 => 0,
            n => self.size / n as u64,
        }
    }

    /// Whether the module takes part in the goal
    pub fn contains(&self, dimm: DimmId) -> bool {
        self.dimms.contains(&dimm)
    }
}

/// Stable reference to a goal in a [`GoalArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoalHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    goal: Option<RegionGoal>,
}

/// Owner of every live goal
#[derive(Debug, Clone, Default)]
pub struct GoalArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl GoalArena {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a goal and returns its handle
    pub fn insert(&mut self, goal: RegionGoal) -> GoalHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.goal = Some(goal);
            return GoalHandle { index, generation: slot.generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { generation: 0, goal: Some(goal) });
        GoalHandle { index, generation: 0 }
    }

    /// Goal behind a handle; `None` once the goal was freed
    pub fn get(&self, handle: GoalHandle) -> Option<&RegionGoal> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.goal.as_ref())
    }

    /// Mutable goal behind a handle
    pub fn get_mut(&mut self, handle: GoalHandle) -> Option<&mut RegionGoal> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.goal.as_mut())
    }

    /// Frees a goal; every copy of the handle stops resolving
    pub fn remove(&mut self, handle: GoalHandle) -> Option<RegionGoal> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let goal = slot.goal.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Some(goal)
    }

    /// Number of live goals
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no goal is live
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live goals with their handles
    pub fn iter(&self) -> impl Iterator<Item = (GoalHandle, &RegionGoal)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.goal.as_ref().map(|goal| {
                (GoalHandle { index: index as u32, generation: slot.generation }, goal)
            })
        })
    }

    /// Frees every goal
    pub fn clear(&mut self) {
        let handles: Vec<GoalHandle> = self.iter().map(|(handle, _)| handle).collect();
        for handle in handles {
            self.remove(handle);
        }
    }
}

/// Interleave granularity requested by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriverPreferences {
    /// Requested iMC interleave granularity
    pub imc_interleaving: InterleaveSize,
    /// Requested channel interleave granularity
    pub channel_interleaving: InterleaveSize,
}

impl DriverPreferences {
    /// Preferences with both sizes set
    pub fn explicit(imc: InterleaveSize, channel: InterleaveSize) -> Self {
        Self { imc_interleaving: imc, channel_interleaving: channel }
    }

    /// Both sizes defer to the platform
    pub fn is_default(&self) -> bool {
        self.imc_interleaving.is_default() && self.channel_interleaving.is_default()
    }
}

/// Shape of a goal before any module is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGoalTemplate {
    /// Kind of interleave set the template yields
    pub set_type: InterleaveSetType,
    /// Built from the per-module capacity above the smallest module
    pub asymmetrical: bool,
}

/// Per-module split used while sizing a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionGoalDimm {
    /// Module the split belongs to
    pub dimm: DimmId,
    /// AppDirect bytes on the module
    pub region_size: u64,
    /// Volatile bytes on the module
    pub volatile_size: u64,
}

impl RegionGoalDimm {
    /// Empty split for a module
    pub fn new(dimm: DimmId) -> Self {
        Self { dimm, region_size: 0, volatile_size: 0 }
    }
}

/// Builds one goal and takes the next interleave set index
///
/// Non-interleaved goals and requests without preferences use the platform
/// default granularity. A module count with no matching width gets empty
/// ways and is left for platform verification to reject.
pub fn create_goal(
    template: &RegionGoalTemplate,
    dimms: Vec<DimmId>,
    size: u64,
    preferences: Option<&DriverPreferences>,
    sequence_index: u16,
    next_index: &mut u16,
) -> Result<RegionGoal> {
    if usize::from(sequence_index) >= MAX_IS_PER_DIMM {
        return Err(Error::Aborted("goal sequence index exceeds per-DIMM limit".into()));
    }
    let (imc_interleaving, channel_interleaving) = match preferences {
        Some(prefs) if template.set_type != InterleaveSetType::NonInterleaved => {
            (prefs.imc_interleaving, prefs.channel_interleaving)
        }
        _ => (InterleaveSize::DEFAULT, InterleaveSize::DEFAULT),
    };

    let channel_ways = ChannelWays::from_dimm_count(dimms.len());
    if channel_ways.is_empty() {
        pmem_warn!("Unsupported number of modules in interleave set: {}", dimms.len());
    }

    let interleave_set_index = *next_index;
    *next_index = next_index
        .checked_add(1)
        .ok_or_else(|| Error::Aborted("interleave set index space exhausted".into()))?;

    pmem_trace!(
        "goal #{} seq {} size {:#x} over {} modules",
        interleave_set_index,
        sequence_index,
        size,
        dimms.len()
    );

    Ok(RegionGoal {
        sequence_index,
        size,
        set_type: template.set_type,
        imc_interleaving,
        channel_interleaving,
        channel_ways,
        interleave_set_index,
        dimms,
    })
}

/// One past the highest interleave set index in use
///
/// Goals and current interleave sets of every module count, so a new index
/// never collides with a set that survives on modules outside the request.
pub fn next_interleave_set_index(inventory: &DimmInventory, arena: &GoalArena) -> Result<u16> {
    let goal_max = inventory
        .iter()
        .flat_map(Dimm::goal_handles)
        .filter_map(|handle| arena.get(handle))
        .map(|goal| goal.interleave_set_index)
        .max()
        .unwrap_or(0);
    let set_max = inventory
        .iter()
        .flat_map(|dimm| dimm.config.interleave_sets.iter().copied())
        .max()
        .unwrap_or(0);
    goal_max
        .max(set_max)
        .checked_add(1)
        .ok_or_else(|| Error::Aborted("interleave set index space exhausted".into()))
}

/// Inputs plus manageable modules sharing a current interleave set with them
///
/// Only modules whose current configuration was applied are followed; a
/// module from a broken set may have been moved from another platform.
pub fn find_related_dimms_by_regions(
    inventory: &DimmInventory,
    sets: &[InterleaveSet],
    dimms: &[DimmId],
) -> Result<Vec<DimmId>> {
    let mut related = dimms.to_vec();
    for id in dimms {
        let dimm = inventory.require(*id)?;
        if !dimm.config_succeeded() {
            continue;
        }
        for set_index in &dimm.config.interleave_sets {
            let Some(set) = sets.iter().find(|set| set.index == *set_index) else {
                continue;
            };
            for region in &set.dimm_regions {
                push_related(inventory, &mut related, region.dimm)?;
            }
        }
    }
    Ok(related)
}

/// Inputs plus manageable modules sharing a goal with them
pub fn find_related_dimms_by_goals(
    inventory: &DimmInventory,
    arena: &GoalArena,
    dimms: &[DimmId],
) -> Result<Vec<DimmId>> {
    let mut related = dimms.to_vec();
    for id in dimms {
        let dimm = inventory.require(*id)?;
        for handle in dimm.goal_handles() {
            let Some(goal) = arena.get(handle) else {
                continue;
            };
            for member in &goal.dimms {
                push_related(inventory, &mut related, *member)?;
            }
        }
    }
    Ok(related)
}

fn push_related(inventory: &DimmInventory, related: &mut Vec<DimmId>, id: DimmId) -> Result<()> {
    if related.contains(&id) {
        return Ok(());
    }
    if related.len() >= pmem_api::MAX_DIMMS {
        return Err(Error::Aborted("related module list exceeds platform maximum".into()));
    }
    if inventory.get(id).is_some_and(|dimm| dimm.manageable) {
        related.push(id);
    }
    Ok(())
}

/// Distinct goals referenced by a set of modules
pub fn find_unique_goals(inventory: &DimmInventory, dimms: &[DimmId]) -> Result<Vec<GoalHandle>> {
    let mut goals: Vec<GoalHandle> = Vec::new();
    for id in dimms {
        for handle in inventory.require(*id)?.goal_handles() {
            if goals.contains(&handle) {
                continue;
            }
            if goals.len() >= MAX_IS_CONFIGS {
                return Err(Error::Aborted("more goals than interleave configs".into()));
            }
            goals.push(handle);
        }
    }
    Ok(goals)
}

/// Clears goal bookkeeping on every module and frees every goal
pub fn clear_internal_goal_configs(inventory: &mut DimmInventory, arena: &mut GoalArena) {
    pmem_warn!("Clearing all in-memory goal configurations");
    arena.clear();
    inventory.reset_goal_state();
}

/// Staged goal assignment, applied atomically by [`GoalChangeset::commit`]
#[derive(Debug, Clone, Default)]
pub struct GoalChangeset {
    goals: Vec<RegionGoal>,
    specified: Vec<(DimmId, u64)>,
    unspecified: Vec<DimmId>,
    reset: Vec<DimmId>,
    retired: Vec<GoalHandle>,
}

impl GoalChangeset {
    /// Empty changeset
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a goal
    pub fn push_goal(&mut self, goal: RegionGoal) {
        self.goals.push(goal);
    }

    /// Staged goals in staging order
    pub fn goals(&self) -> &[RegionGoal] {
        &self.goals
    }

    /// Mutable staged goals
    pub fn goals_mut(&mut self) -> &mut [RegionGoal] {
        &mut self.goals
    }

    /// Marks a module as part of the request with its volatile goal
    pub fn specify(&mut self, dimm: DimmId, volatile_size: u64) {
        self.reset_slots(dimm);
        if !self.specified.iter().any(|(id, _)| *id == dimm) {
            self.specified.push((dimm, volatile_size));
        }
    }

    /// Marks a related module outside the request; its goal is dropped
    pub fn unspecify(&mut self, dimm: DimmId) {
        self.reset_slots(dimm);
        if !self.unspecified.contains(&dimm) {
            self.unspecified.push(dimm);
        }
    }

    fn reset_slots(&mut self, dimm: DimmId) {
        if !self.reset.contains(&dimm) {
            self.reset.push(dimm);
        }
    }

    /// Existing goals to free on commit
    pub fn retire(&mut self, handles: Vec<GoalHandle>) {
        for handle in handles {
            if !self.retired.contains(&handle) {
                self.retired.push(handle);
            }
        }
    }

    /// Specified modules with their volatile goals
    pub fn specified(&self) -> &[(DimmId, u64)] {
        &self.specified
    }

    /// Whether the module was specified
    pub fn is_specified(&self, dimm: DimmId) -> bool {
        self.specified.iter().any(|(id, _)| *id == dimm)
    }

    /// Applies every staged change or none of them
    pub fn commit(self, inventory: &mut DimmInventory, arena: &mut GoalArena) -> Result<Vec<GoalHandle>> {
        for goal in &self.goals {
            if usize::from(goal.sequence_index) >= MAX_IS_PER_DIMM {
                return Err(Error::Aborted("goal sequence index exceeds per-DIMM limit".into()));
            }
            for dimm in &goal.dimms {
                inventory.require(*dimm)?;
            }
        }
        for dimm in self.reset.iter().chain(self.specified.iter().map(|(id, _)| id)) {
            inventory.require(*dimm)?;
        }

        for id in &self.reset {
            inventory.require_mut(*id)?.goal.clear_goals();
        }
        for handle in self.retired {
            arena.remove(handle);
        }

        let mut handles = Vec::with_capacity(self.goals.len());
        for goal in self.goals {
            let sequence_index = goal.sequence_index;
            let members = goal.dimms.clone();
            let handle = arena.insert(goal);
            for member in members {
                inventory.require_mut(member)?.set_goal(sequence_index, handle)?;
            }
            handles.push(handle);
        }

        for (id, volatile_size) in self.specified {
            let dimm = inventory.require_mut(id)?;
            dimm.goal.regions_goal_config = true;
            dimm.goal.volatile_size_goal = volatile_size;
            dimm.goal.status = GoalConfigStatus::New;
            dimm.goal.pcd_synced = false;
        }
        for id in self.unspecified {
            let dimm = inventory.require_mut(id)?;
            dimm.goal.reset();
            dimm.goal.status = GoalConfigStatus::New;
            dimm.goal.pcd_synced = false;
        }
        Ok(handles)
    }
}
