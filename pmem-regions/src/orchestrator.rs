//! Goal lifecycle
//!
//! Entry points a management session drives against its [`RegionContext`]:
//!
//! - [`create_goal_config`] plans new region goals for a set of modules
//! - [`delete_goal_configs`] drops pending goals
//! - [`apply_goal_configs`] writes pending goals to the modules' PCD
//! - [`retrieve_goal_configs`] rebuilds goals from what the modules hold
//!
//! Goal creation stages everything in a [`GoalChangeset`]. A failure while
//! goals are being built discards the changeset ([`rollback_simple`]) and
//! clears goal bookkeeping on every module ([`rollback_advanced`]).

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use pmem_api::{
    CommandStatus, DimmId, Error, NvmStatusCode, ObjectId, Result, SocketId, aborted, invalid_parameter,
    pmem_debug, pmem_error, pmem_info, pmem_warn, round_down, unsupported,
};

use crate::config::EngineConfig;
use crate::dimm::{Dimm, DimmInventory, GoalConfigStatus};
use crate::goal::{
    DriverPreferences, GoalArena, GoalChangeset, GoalHandle, InterleaveSetType, RegionGoal, RegionGoalDimm,
    RegionGoalTemplate, clear_internal_goal_configs, create_goal, find_related_dimms_by_goals, find_unique_goals,
    next_interleave_set_index,
};
use crate::interleave::{InterleaveRequest, plan_interleaving};
use crate::pcd::{
    ConfigInputBuilder, ConfigOutput, ConfigOutputStatus, ConfigSender, InterleaveChangeStatus,
    InterleaveInformation, PartitionSizeChangeStatus, PcatTable, PlatformConfigSource,
};
use crate::platform::PlatformCapabilities;
use crate::reconstruct::{NfitTables, check_reconstruction_consistency, reconstruct_from_nfit, reconstruct_from_pcd};
use crate::reduce::{SocketRequest, reduce_for_socket_sku};
use crate::region::InterleaveSet;
use crate::template::{
    PersistentMemoryType, TemplateRequest, apply_interleave_set_limits, calculate_dimm_capacity_from_percent,
    resolve_templates,
};
use crate::verify::{
    UniformLayout, app_direct_settings_conflict, app_direct_settings_validation, select_reserve_dimm,
    validate_regions_correlations, verify_creating_supported_region_configs, verify_deleting_supported_region_configs,
    verify_interleave_sets_platform_support, verify_max_pm_interleave_sets, verify_nm_fm_ratio,
    verify_platform_support, verify_sku_support_for_create_goal,
};

/// Everything one management session plans against
#[derive(Debug, Clone)]
pub struct RegionContext {
    /// Modules known to the session
    pub inventory: DimmInventory,
    /// Pending goals referenced by the modules
    pub arena: GoalArena,
    /// Interleave sets from the last reconstruction
    pub sets: Vec<InterleaveSet>,
    /// Platform capabilities from PCAT, SKU and PMTT data
    pub platform: PlatformCapabilities,
    /// Engine policy
    pub config: EngineConfig,
}

impl RegionContext {
    /// Context with no goals and no reconstructed sets
    pub fn new(inventory: DimmInventory, platform: PlatformCapabilities, config: EngineConfig) -> Self {
        Self {
            inventory,
            arena: GoalArena::new(),
            sets: Vec::new(),
            platform,
            config,
        }
    }

    /// Rebuilds the current interleave sets from PCD and NFIT
    ///
    /// When the NFIT carries SPA ranges both paths run and must agree on the
    /// manageable modules; the PCD view is kept either way.
    pub fn reconstruct<S: PlatformConfigSource + ?Sized>(
        &mut self,
        source: &S,
        nfit: &NfitTables,
        status: &mut CommandStatus,
    ) -> Result<()> {
        self.clear_interleave_sets();
        let version = self.config.label_version;
        self.sets = reconstruct_from_pcd(&mut self.inventory, source, nfit, version, status)?;
        pmem_info!("Reconstructed {} interleave sets", self.sets.len());

        if !nfit.spa_ranges.is_empty() {
            let from_nfit = reconstruct_from_nfit(&self.inventory, nfit, version);
            if let Err(err) = check_reconstruction_consistency(&self.inventory, &self.sets, &from_nfit) {
                status.set(NvmStatusCode::DeviceError);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Forgets the reconstructed sets and every module's membership
    pub fn clear_interleave_sets(&mut self) {
        self.sets.clear();
        for dimm in self.inventory.iter_mut() {
            dimm.config.interleave_sets.clear();
        }
    }

    /// Reconstructed set with the given index
    pub fn interleave_set(&self, index: u16) -> Option<&InterleaveSet> {
        self.sets.iter().find(|set| set.index == index)
    }

    /// Goals of a module in sequence order
    pub fn goals_of(&self, dimm: DimmId) -> Vec<&RegionGoal> {
        self.inventory
            .get(dimm)
            .map(|dimm| dimm.goal_handles().filter_map(|handle| self.arena.get(handle)).collect())
            .unwrap_or_default()
    }
}

/// How the reserve module is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveDimmType {
    /// Whole module left as persistent capacity without a region
    Storage,
    /// Whole module as one non-interleaved AppDirect region
    AppDirectNotInterleaved,
}

/// A create-goal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGoalRequest {
    /// Target modules; empty means every manageable module
    pub dimms: Vec<DimmId>,
    /// Share of capacity to map as volatile memory
    pub volatile_percent: u32,
    /// Capacity left unconfigured
    pub reserved_percent: u32,
    /// Layout of the persistent capacity
    pub pm_type: PersistentMemoryType,
    /// Interleave granularity for AppDirect sets
    pub preferences: DriverPreferences,
    /// Hold one module back as a reserve
    pub reserve_dimm: Option<ReserveDimmType>,
}

impl Default for CreateGoalRequest {
    fn default() -> Self {
        Self {
            dimms: Vec::new(),
            volatile_percent: 0,
            reserved_percent: 0,
            pm_type: PersistentMemoryType::AppDirect,
            preferences: DriverPreferences::default(),
            reserve_dimm: None,
        }
    }
}

impl CreateGoalRequest {
    /// Full AppDirect request over every manageable module
    pub fn new() -> Self {
        Self::default()
    }

    /// Targets the given modules
    pub fn with_dimms(mut self, dimms: &[DimmId]) -> Self {
        self.dimms = dimms.to_vec();
        self
    }

    /// Sets the volatile share in percent
    pub fn with_volatile_percent(mut self, percent: u32) -> Self {
        self.volatile_percent = percent;
        self
    }

    /// Sets the unconfigured share in percent
    pub fn with_reserved_percent(mut self, percent: u32) -> Self {
        self.reserved_percent = percent;
        self
    }

    /// Sets the persistent layout
    pub fn with_pm_type(mut self, pm_type: PersistentMemoryType) -> Self {
        self.pm_type = pm_type;
        self
    }

    /// Sets the AppDirect interleave granularity
    pub fn with_preferences(mut self, preferences: DriverPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Holds back the last requested module
    pub fn with_reserve_dimm(mut self, reserve: ReserveDimmType) -> Self {
        self.reserve_dimm = Some(reserve);
        self
    }

    /// Layouts allowed to skip already matching modules on a socket
    fn uniform_layout(&self) -> Option<UniformLayout> {
        if self.volatile_percent == 100 {
            Some(UniformLayout::Volatile)
        } else if self.pm_type == PersistentMemoryType::AppDirectNotInterleaved
            && self.volatile_percent == 0
            && self.reserved_percent == 0
        {
            Some(UniformLayout::AppDirectNotInterleaved)
        } else {
            None
        }
    }
}

/// Result of a committed create-goal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalPlan {
    /// Goals created by the request
    pub handles: Vec<GoalHandle>,
    /// Volatile bytes granted across all sockets
    pub volatile_actual: u64,
    /// Interleave set index the next request would start from
    pub next_interleave_set_index: u16,
}

/// Split capacity and templates handed to [`map_regions_goal`]
#[derive(Debug, Clone, Copy)]
pub struct GoalMapping<'a> {
    /// Per-module shares interleaved across every module
    pub symmetrical: &'a [RegionGoalDimm],
    /// Per-module shares above the smallest module
    pub asymmetrical: &'a [RegionGoalDimm],
    /// Reserve module and how it is configured
    pub reserve: Option<(DimmId, ReserveDimmType)>,
    /// Templates of every socket in sequence order
    pub templates: &'a [RegionGoalTemplate],
    /// Driver interleave granularity
    pub preferences: &'a DriverPreferences,
}

/// Drops goals staged by a failed request
pub fn rollback_simple(changeset: GoalChangeset) {
    pmem_warn!("Discarding {} staged region goals", changeset.goals().len());
    drop(changeset);
}

/// Clears goal bookkeeping on every module
pub fn rollback_advanced(ctx: &mut RegionContext) {
    clear_internal_goal_configs(&mut ctx.inventory, &mut ctx.arena);
}

fn resolve_request_dimms(
    inventory: &DimmInventory,
    requested: &[DimmId],
    status: &mut CommandStatus,
) -> Result<Vec<DimmId>> {
    if requested.is_empty() {
        let all: Vec<DimmId> = inventory.manageable().map(|dimm| dimm.id).collect();
        if all.is_empty() {
            status.set(NvmStatusCode::ManageableDimmNotFound);
            return Err(Error::NotFound("no manageable modules".into()));
        }
        return Ok(all);
    }

    let mut dimms = Vec::with_capacity(requested.len());
    for id in requested {
        match inventory.get(*id) {
            None => {
                status.set_object_status_and_general(ObjectId::Dimm(*id), NvmStatusCode::DimmNotFound);
                return Err(Error::NotFound(format!("module {} not found", id)));
            }
            Some(dimm) if !dimm.manageable => {
                status.set_object_status_and_general(ObjectId::Dimm(*id), NvmStatusCode::ManageableDimmNotFound);
                return Err(invalid_parameter("module is not manageable"));
            }
            Some(_) => {
                if !dimms.contains(id) {
                    dimms.push(*id);
                }
            }
        }
    }
    Ok(dimms)
}

fn dimms_of<'a>(inventory: &'a DimmInventory, ids: &[DimmId]) -> Result<Vec<&'a Dimm>> {
    ids.iter().map(|id| inventory.require(*id)).collect()
}

/// Plans and commits region goals for a request
///
/// Validation failures leave every module untouched. Once goal building
/// starts, a failure rolls back goal bookkeeping system-wide.
pub fn create_goal_config(
    ctx: &mut RegionContext,
    request: &CreateGoalRequest,
    status: &mut CommandStatus,
) -> Result<GoalPlan> {
    if request.volatile_percent > 100
        || request.reserved_percent > 100
        || request.volatile_percent + request.reserved_percent > 100
    {
        status.set(NvmStatusCode::InvalidParameter);
        return Err(invalid_parameter("volatile and reserved percent exceed 100"));
    }
    let mut dimms = resolve_request_dimms(&ctx.inventory, &request.dimms, status)?;

    if request.pm_type == PersistentMemoryType::AppDirect && !request.preferences.is_default() {
        if let Err(err) = app_direct_settings_validation(&ctx.platform, &request.preferences) {
            status.set(NvmStatusCode::InvalidParameter);
            return Err(err);
        }
    }

    let requested_volatile =
        calculate_dimm_capacity_from_percent(&dimms_of(&ctx.inventory, &dimms)?, request.volatile_percent)?;
    verify_platform_support(&ctx.platform, requested_volatile, request.pm_type, status)?;

    if request.pm_type == PersistentMemoryType::AppDirect
        && request.volatile_percent + request.reserved_percent < 100
        && app_direct_settings_conflict(
            &ctx.inventory,
            &ctx.platform,
            &ctx.sets,
            &request.preferences,
            &dimms,
            status,
        )?
    {
        return Err(unsupported("interleave sizes differ from AppDirect sets kept in the system"));
    }

    verify_creating_supported_region_configs(&ctx.inventory, &ctx.sets, &dimms, request.uniform_layout(), status)?;

    let reserve = match request.reserve_dimm {
        Some(kind) => Some((
            select_reserve_dimm(&mut dimms, ctx.config.reserve_dimm_requires_two, status)?,
            kind,
        )),
        None => None,
    };

    let alignments = ctx.config.alignments;
    let mut sockets = BTreeSet::new();
    for dimm in dimms_of(&ctx.inventory, &dimms)? {
        sockets.insert(dimm.socket());
    }

    let mut templates = Vec::new();
    let mut symmetrical = Vec::new();
    let mut asymmetrical = Vec::new();
    let mut volatile_actual = 0u64;
    for socket in sockets {
        let ids: Vec<DimmId> = dimms
            .iter()
            .copied()
            .filter(|id| ctx.inventory.get(*id).is_some_and(|dimm| dimm.socket() == socket))
            .collect();
        let on_socket = dimms_of(&ctx.inventory, &ids)?;
        let template_request = TemplateRequest {
            socket,
            volatile_size: calculate_dimm_capacity_from_percent(&on_socket, request.volatile_percent)?,
            pm_type: request.pm_type,
            reserved_size: calculate_dimm_capacity_from_percent(&on_socket, request.reserved_percent)?,
        };

        let mut split = resolve_templates(
            &alignments,
            &ctx.platform,
            &on_socket,
            &template_request,
            &mut templates,
            status,
        )?;
        apply_interleave_set_limits(ctx.platform.max_pm_interleave_sets, request.pm_type, socket, &mut split, status);
        reduce_for_socket_sku(
            &ctx.inventory,
            &ctx.platform,
            &alignments,
            &SocketRequest { socket, dimms: &ids },
            &mut split,
            status,
        )?;

        let granted: u64 = if split.volatile_actual > 0 {
            split.symmetrical.iter().map(|dimm| dimm.volatile_size).sum()
        } else {
            0
        };
        verify_nm_fm_ratio(&ctx.platform, &ctx.config.nm_fm, socket, granted, status)?;

        volatile_actual += granted;
        symmetrical.extend(split.symmetrical);
        asymmetrical.extend(split.asymmetrical);
    }

    let mut next_index = next_interleave_set_index(&ctx.inventory, &ctx.arena)?;
    let mapping = GoalMapping {
        symmetrical: &symmetrical,
        asymmetrical: &asymmetrical,
        reserve,
        templates: &templates,
        preferences: &request.preferences,
    };
    let changeset = map_regions_goal(ctx, &mapping, &mut next_index, status)?;

    if let Err(err) = verify_sku_support_for_create_goal(&ctx.inventory, &changeset, status) {
        rollback_simple(changeset);
        rollback_advanced(ctx);
        return Err(err);
    }

    let handles = match changeset.commit(&mut ctx.inventory, &mut ctx.arena) {
        Ok(handles) => handles,
        Err(err) => {
            rollback_advanced(ctx);
            return Err(err);
        }
    };

    status.set(NvmStatusCode::Success);
    pmem_info!(
        "Created {} region goals, volatile {:#x}, next interleave set index {}",
        handles.len(),
        volatile_actual,
        next_index
    );
    Ok(GoalPlan {
        handles,
        volatile_actual,
        next_interleave_set_index: next_index,
    })
}

/// Builds goals for every socket of the request into a changeset
///
/// The existing goals of every related module are retired. Modules related
/// by goals but not specified lose their goal.
pub fn map_regions_goal(
    ctx: &mut RegionContext,
    mapping: &GoalMapping<'_>,
    next_index: &mut u16,
    status: &mut CommandStatus,
) -> Result<GoalChangeset> {
    let mut specified: Vec<DimmId> = mapping.symmetrical.iter().map(|dimm| dimm.dimm).collect();
    if let Some((reserve, _)) = mapping.reserve {
        specified.push(reserve);
    }
    if specified.is_empty() {
        return Err(invalid_parameter("no modules to map goals onto"));
    }

    validate_regions_correlations(&ctx.inventory, &ctx.arena, &ctx.sets, &specified, status)?;
    let related = find_related_dimms_by_goals(&ctx.inventory, &ctx.arena, &specified)?;
    let mut changeset = GoalChangeset::new();
    changeset.retire(find_unique_goals(&ctx.inventory, &related)?);

    if let Err(err) = stage_socket_goals(ctx, mapping, &related, next_index, &mut changeset, status) {
        rollback_simple(changeset);
        rollback_advanced(ctx);
        return Err(err);
    }

    if let Some((reserve, kind)) = mapping.reserve {
        if let Err(err) = stage_reserve_dimm(ctx, reserve, kind, mapping.preferences, next_index, &mut changeset, status)
        {
            pmem_warn!("Reserve DIMM {} goal failed, clearing goal bookkeeping", reserve);
            rollback_advanced(ctx);
            return Err(err);
        }
    }
    Ok(changeset)
}

fn stage_socket_goals(
    ctx: &RegionContext,
    mapping: &GoalMapping<'_>,
    related: &[DimmId],
    next_index: &mut u16,
    changeset: &mut GoalChangeset,
    status: &mut CommandStatus,
) -> Result<()> {
    let reserve = mapping.reserve.map(|(id, _)| id);
    let sockets: BTreeSet<SocketId> = related
        .iter()
        .filter_map(|id| ctx.inventory.get(*id))
        .map(Dimm::socket)
        .collect();

    for socket in sockets {
        let on_socket: Vec<DimmId> = related
            .iter()
            .copied()
            .filter(|id| Some(*id) != reserve)
            .filter(|id| ctx.inventory.get(*id).is_some_and(|dimm| dimm.socket() == socket))
            .collect();
        let pick = |list: &[RegionGoalDimm]| -> Vec<RegionGoalDimm> {
            on_socket
                .iter()
                .filter_map(|id| list.iter().find(|entry| entry.dimm == *id).copied())
                .collect()
        };
        let symmetrical = pick(mapping.symmetrical);
        let asymmetrical = pick(mapping.asymmetrical);
        if symmetrical.is_empty() {
            continue;
        }

        let mut goals = Vec::new();
        for (sequence, template) in mapping.templates.iter().enumerate() {
            if template.set_type == InterleaveSetType::NonInterleaved {
                continue;
            }
            let members = if template.asymmetrical { &asymmetrical } else { &symmetrical };
            if members.is_empty() {
                continue;
            }
            let ids: Vec<DimmId> = members.iter().map(|entry| entry.dimm).collect();
            let request = InterleaveRequest {
                template,
                dimms: &ids,
                size: members.iter().map(|entry| entry.region_size).sum(),
                preferences: Some(mapping.preferences),
                sequence_index: sequence as u16,
            };
            goals.extend(plan_interleaving(&ctx.platform.topology, &ctx.inventory, &request, next_index)?);
        }
        for (sequence, template) in mapping.templates.iter().enumerate() {
            if template.set_type != InterleaveSetType::NonInterleaved {
                continue;
            }
            let members = if template.asymmetrical { &asymmetrical } else { &symmetrical };
            for entry in members.iter().filter(|entry| entry.region_size > 0) {
                goals.push(create_goal(
                    template,
                    vec![entry.dimm],
                    entry.region_size,
                    Some(mapping.preferences),
                    sequence as u16,
                    next_index,
                )?);
            }
        }

        verify_interleave_sets_platform_support(&ctx.platform, &mut goals, status)?;
        let surviving = ctx
            .sets
            .iter()
            .filter(|set| set.socket == socket)
            .filter(|set| !set.dimm_regions.iter().any(|region| related.contains(&region.dimm)))
            .count();
        verify_max_pm_interleave_sets(&ctx.platform, socket, goals.len(), surviving, status)?;

        pmem_debug!("Socket {}: staging {} region goals", socket, goals.len());
        for goal in goals {
            changeset.push_goal(goal);
        }
        for id in on_socket {
            match symmetrical.iter().find(|entry| entry.dimm == id) {
                Some(entry) => changeset.specify(id, entry.volatile_size),
                None => changeset.unspecify(id),
            }
        }
    }
    Ok(())
}

fn stage_reserve_dimm(
    ctx: &RegionContext,
    reserve: DimmId,
    kind: ReserveDimmType,
    preferences: &DriverPreferences,
    next_index: &mut u16,
    changeset: &mut GoalChangeset,
    status: &mut CommandStatus,
) -> Result<()> {
    if kind == ReserveDimmType::AppDirectNotInterleaved {
        let dimm = ctx.inventory.require(reserve)?;
        let template = RegionGoalTemplate {
            set_type: InterleaveSetType::NonInterleaved,
            asymmetrical: false,
        };
        let size = round_down(dimm.raw_capacity, ctx.config.alignments.persistent);
        let goal = create_goal(&template, vec![reserve], size, Some(preferences), 0, next_index)?;
        let mut goals = [goal];
        verify_interleave_sets_platform_support(&ctx.platform, &mut goals, status)?;
        let [goal] = goals;
        changeset.push_goal(goal);
    }
    changeset.specify(reserve, 0);
    Ok(())
}

/// Drops the pending goals of the given modules
///
/// Every module sharing a goal with the input must be part of it. Modules
/// without a goal are reported but do not fail the call.
pub fn delete_goal_configs(ctx: &mut RegionContext, dimms: &[DimmId], status: &mut CommandStatus) -> Result<()> {
    let dimms = resolve_request_dimms(&ctx.inventory, dimms, status)?;

    let related = find_related_dimms_by_goals(&ctx.inventory, &ctx.arena, &dimms)?;
    if related.len() != dimms.len() {
        for id in related.iter().filter(|id| !dimms.contains(id)) {
            status.set_object_status(ObjectId::Dimm(*id), NvmStatusCode::RegionGoalConfAffectsUnspecDimm);
        }
        status.set(NvmStatusCode::RegionGoalConfAffectsUnspecDimm);
        return Err(invalid_parameter("goal spans modules outside the request"));
    }
    verify_deleting_supported_region_configs(&ctx.inventory, &dimms, status)?;

    let existing = find_unique_goals(&ctx.inventory, &related)?;
    for id in &related {
        let dimm = ctx.inventory.require_mut(*id)?;
        if dimm.goal.regions_goal_config {
            dimm.goal.reset();
            dimm.goal.status = GoalConfigStatus::NoGoalOrSuccess;
            dimm.goal.pcd_synced = false;
        } else {
            dimm.goal.pcd_synced = true;
            status.set_object_status(ObjectId::Dimm(*id), NvmStatusCode::RegionNoGoalExistsOnDimm);
        }
    }
    for handle in existing {
        ctx.arena.remove(handle);
    }
    Ok(())
}

fn applying_failed(status: &mut CommandStatus, dimm: DimmId, err: Error) -> Error {
    pmem_error!("DIMM {}: applying goal config failed: {}", dimm, err);
    status.set_object_status_and_general(ObjectId::Dimm(dimm), NvmStatusCode::RegionConfApplyingFailed);
    err
}

/// Writes every unsynchronised goal to its module
///
/// Stale config inputs are cleared first, then new ones are sent to
/// modules that have a goal. Modules are marked synchronised only once
/// every write succeeded.
pub fn apply_goal_configs<S: ConfigSender + ?Sized>(
    ctx: &mut RegionContext,
    sender: &mut S,
    status: &mut CommandStatus,
) -> Result<()> {
    let pending: Vec<DimmId> = ctx
        .inventory
        .manageable()
        .filter(|dimm| !dimm.goal.pcd_synced)
        .map(|dimm| dimm.id)
        .collect();

    for id in &pending {
        if let Err(err) = sender.clear_config_input(*id) {
            return Err(applying_failed(status, *id, err));
        }
    }

    let builder = ConfigInputBuilder::new(&ctx.inventory, &ctx.arena);
    for id in &pending {
        if !ctx.inventory.require(*id)?.goal.regions_goal_config {
            continue;
        }
        let sent = sender
            .next_sequence_number(*id)
            .and_then(|sequence| builder.build(*id, sequence))
            .and_then(|input| sender.send_config_input(*id, &input));
        if let Err(err) = sent {
            return Err(applying_failed(status, *id, err));
        }
    }

    for id in pending {
        ctx.inventory.require_mut(id)?.goal.pcd_synced = true;
        status.set_object_status(ObjectId::Dimm(id), NvmStatusCode::Success);
    }
    status.set(NvmStatusCode::Success);
    Ok(())
}

fn partition_change_goal_status(status: PartitionSizeChangeStatus) -> Option<GoalConfigStatus> {
    match status {
        PartitionSizeChangeStatus::Success => None,
        PartitionSizeChangeStatus::DimmMissing
        | PartitionSizeChangeStatus::IsetMissing
        | PartitionSizeChangeStatus::UnsupportedAlignment => Some(GoalConfigStatus::BadRequest),
        PartitionSizeChangeStatus::ExceedDramDecoders | PartitionSizeChangeStatus::ExceedSize => {
            Some(GoalConfigStatus::NotEnoughResources)
        }
        PartitionSizeChangeStatus::FwError => Some(GoalConfigStatus::FirmwareError),
        PartitionSizeChangeStatus::Reserved | PartitionSizeChangeStatus::Undefined => {
            Some(GoalConfigStatus::FailedUnknown)
        }
    }
}

fn interleave_change_goal_status(status: InterleaveChangeStatus) -> Option<GoalConfigStatus> {
    match status {
        InterleaveChangeStatus::Success => None,
        InterleaveChangeStatus::DimmMissing
        | InterleaveChangeStatus::IsetMissing
        | InterleaveChangeStatus::ChannelNotMatch
        | InterleaveChangeStatus::UnsupportedAlignment
        | InterleaveChangeStatus::CinMissing => Some(GoalConfigStatus::BadRequest),
        InterleaveChangeStatus::ExceedDramDecoders
        | InterleaveChangeStatus::ExceedMaxSpaSpace
        | InterleaveChangeStatus::MirrorFailed => Some(GoalConfigStatus::NotEnoughResources),
        _ => Some(GoalConfigStatus::FailedUnknown),
    }
}

/// Goal status implied by a module's config output
///
/// An output for another sequence number has not seen the input yet. A
/// failed output is explained by its first table that did not succeed.
pub fn resolve_goal_status(input_sequence: u32, output: Option<&ConfigOutput>) -> Result<GoalConfigStatus> {
    let Some(output) = output.filter(|output| output.sequence_number == input_sequence) else {
        return Ok(GoalConfigStatus::New);
    };
    if output.validation_status == ConfigOutputStatus::Success {
        return Ok(GoalConfigStatus::NoGoalOrSuccess);
    }
    for table in &output.tables {
        let resolved = match table {
            PcatTable::PartitionSizeChange(change) => partition_change_goal_status(change.status),
            PcatTable::InterleaveInformation(info) => interleave_change_goal_status(info.status),
            PcatTable::ConfigManagementAttributes => None,
            PcatTable::Unknown(kind) => {
                pmem_error!("Unknown config output table type {}", kind);
                return Err(aborted("unknown config output table"));
            }
        };
        if let Some(status) = resolved {
            return Ok(status);
        }
    }
    Ok(GoalConfigStatus::Unknown)
}

/// Recreates a goal from one interleave information table
///
/// Returns `None` when a member is not in the inventory.
fn goal_from_interleave_information(
    inventory: &mut DimmInventory,
    arena: &mut GoalArena,
    info: &InterleaveInformation,
    sequence_index: u16,
) -> Result<Option<GoalHandle>> {
    let mut members = Vec::with_capacity(info.identifications.len());
    for identification in &info.identifications {
        match identification.dimm.resolve(inventory) {
            Some(dimm) => members.push(dimm.id),
            None => return Ok(None),
        }
    }

    let set_type = if info.mirror {
        InterleaveSetType::Mirrored
    } else if info.num_dimms == 1 {
        InterleaveSetType::NonInterleaved
    } else {
        InterleaveSetType::Interleaved
    };
    let handle = arena.insert(RegionGoal {
        sequence_index,
        size: info.identifications.iter().map(|identification| identification.partition_size).sum(),
        set_type,
        imc_interleaving: info.imc_interleaving,
        channel_interleaving: info.channel_interleaving,
        channel_ways: info.channel_ways,
        interleave_set_index: info.interleave_set_index,
        dimms: members.clone(),
    });
    for member in members {
        let dimm = inventory.require_mut(member)?;
        let slot = dimm.goal_count() as u16;
        dimm.set_goal(slot, handle)?;
    }
    Ok(Some(handle))
}

/// Rebuilds pending goals from every module's config input and output
///
/// Goals are shared between the modules of a set; the first module that
/// describes a set creates its goal. Any failure clears goal bookkeeping
/// on every module.
pub fn retrieve_goal_configs<S: PlatformConfigSource + ?Sized>(
    ctx: &mut RegionContext,
    source: &S,
    status: &mut CommandStatus,
) -> Result<()> {
    clear_internal_goal_configs(&mut ctx.inventory, &mut ctx.arena);
    let retrieved = retrieve_all(ctx, source, status);
    if retrieved.is_err() {
        rollback_advanced(ctx);
    }
    retrieved
}

fn retrieve_all<S: PlatformConfigSource + ?Sized>(
    ctx: &mut RegionContext,
    source: &S,
    status: &mut CommandStatus,
) -> Result<()> {
    let ids: Vec<DimmId> = ctx.inventory.manageable().map(|dimm| dimm.id).collect();
    let mut retrieved: Vec<u16> = Vec::new();

    for id in ids {
        let data = match source.platform_config(id) {
            Ok(data) => data.unwrap_or_default(),
            Err(err) => {
                pmem_error!("DIMM {}: unable to read platform config data: {}", id, err);
                status.set_object_status(ObjectId::Dimm(id), NvmStatusCode::GetPcdFailed);
                return Err(err);
            }
        };

        let applied = matches!(
            (&data.input, &data.output),
            (Some(input), Some(output))
                if output.sequence_number == input.sequence_number
                    && output.validation_status == ConfigOutputStatus::Success
        );
        let input = match data.input {
            Some(input) if !applied => input,
            _ => {
                let dimm = ctx.inventory.require_mut(id)?;
                dimm.goal.status = GoalConfigStatus::NoGoalOrSuccess;
                dimm.goal.regions_goal_config = false;
                dimm.goal.pcd_synced = true;
                continue;
            }
        };

        {
            let dimm = ctx.inventory.require_mut(id)?;
            dimm.goal.pcd_synced = false;
            dimm.goal.regions_goal_config = true;
        }

        let mut sequence = 0u16;
        for table in &input.tables {
            match table {
                PcatTable::PartitionSizeChange(change) => {
                    let dimm = ctx.inventory.require_mut(id)?;
                    dimm.goal.volatile_size_goal = dimm.raw_capacity.saturating_sub(change.pm_partition_size);
                }
                PcatTable::InterleaveInformation(info) => {
                    if retrieved.contains(&info.interleave_set_index) {
                        sequence += 1;
                        continue;
                    }
                    match goal_from_interleave_information(&mut ctx.inventory, &mut ctx.arena, info, sequence)? {
                        Some(_) => {
                            retrieved.push(info.interleave_set_index);
                            sequence += 1;
                        }
                        None => {
                            pmem_debug!("IS {}: member module missing, goal skipped", info.interleave_set_index);
                        }
                    }
                }
                PcatTable::ConfigManagementAttributes => {}
                PcatTable::Unknown(kind) => {
                    pmem_error!("DIMM {}: unknown config input table type {}", id, kind);
                    return Err(aborted("unknown config input table"));
                }
            }
        }

        let goal_status = resolve_goal_status(input.sequence_number, data.output.as_ref())?;
        let dimm = ctx.inventory.require_mut(id)?;
        dimm.goal.status = goal_status;
        dimm.goal.pcd_synced = true;
    }
    Ok(())
}
