//! Platform and request verification
//!
//! Checks run before and after goal construction. Each check records a
//! status code on the request's [`CommandStatus`] and returns the matching
//! error class; warnings are recorded without failing.

use alloc::vec::Vec;

use pmem_api::{
    CommandStatus, DimmId, Error, NvmStatusCode, ObjectId, Result, SocketId, aborted, invalid_parameter,
    pmem_debug, pmem_warn, unsupported,
};

use crate::config::NmFmRatioPolicy;
use crate::dimm::{DimmInventory, SkuCapabilities};
use crate::goal::{
    DriverPreferences, GoalArena, GoalChangeset, InterleaveSetType, RegionGoal, find_related_dimms_by_goals,
    find_related_dimms_by_regions,
};
use crate::platform::{InterleaveSize, MemoryModes, PlatformCapabilities};
use crate::region::InterleaveSet;
use crate::template::PersistentMemoryType;

/// Requests that may leave already compatible modules of a socket out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformLayout {
    /// Every module gets its own AppDirect set
    AppDirectNotInterleaved,
    /// Every module is volatile
    Volatile,
}

/// Checks the firmware accepts the requested modes
pub fn verify_platform_support(
    platform: &PlatformCapabilities,
    volatile_size: u64,
    pm_type: PersistentMemoryType,
    status: &mut CommandStatus,
) -> Result<()> {
    let info = platform.platform_info()?;
    if !info.mgmt_sw_config_input {
        status.set(NvmStatusCode::PlatformNotSupportManagementSoft);
        return Err(unsupported("firmware does not accept management software config input"));
    }
    if volatile_size > 0 && !info.memory_modes.contains(MemoryModes::MEMORY) {
        status.set(NvmStatusCode::PlatformNotSupport2lmMode);
        return Err(unsupported("memory mode not supported by the platform"));
    }
    if pm_type.is_app_direct() && !info.memory_modes.contains(MemoryModes::APP_DIRECT) {
        status.set(NvmStatusCode::PlatformNotSupportPmMode);
        return Err(unsupported("AppDirect mode not supported by the platform"));
    }
    Ok(())
}

/// Checks goal alignment and interleave format against the platform
///
/// Goals requesting default granularity adopt the recommended format for
/// their width.
pub fn verify_interleave_sets_platform_support(
    platform: &PlatformCapabilities,
    goals: &mut [RegionGoal],
    status: &mut CommandStatus,
) -> Result<()> {
    let capability = platform.pm_direct_capability()?;
    let alignment = capability.alignment()?;

    for goal in goals.iter_mut() {
        let granule = alignment.saturating_mul(goal.dimms_num() as u64);
        if granule == 0 || goal.size % granule != 0 {
            pmem_debug!("Goal #{} lacks the platform interleave alignment", goal.interleave_set_index);
            return Err(aborted("interleave set size not aligned to platform alignment"));
        }
        if goal.size == 0 {
            status.set(NvmStatusCode::RegionSizeTooSmallForIntSetAlignment);
            return Err(aborted("interleave set size below platform alignment"));
        }

        let uses_defaults = goal.imc_interleaving.is_default() && goal.channel_interleaving.is_default();
        let mut found = false;
        for format in capability.formats.iter().filter(|format| format.ways.intersects(goal.channel_ways)) {
            if goal.set_type == InterleaveSetType::Default {
                goal.set_type = InterleaveSetType::Interleaved;
            }
            if uses_defaults && format.recommended {
                goal.imc_interleaving = format.imc;
                goal.channel_interleaving = format.channel;
                found = true;
                break;
            }
            if goal.imc_interleaving == format.imc && goal.channel_interleaving == format.channel {
                found = true;
                break;
            }
        }

        if !found {
            pmem_debug!("Goal #{}: no matching interleave format", goal.interleave_set_index);
            if uses_defaults {
                status.set(NvmStatusCode::PlatformNotSupportDefaultIntSizes);
            } else {
                status.set(NvmStatusCode::PlatformNotSupportSpecifiedIntSizes);
            }
            return Err(aborted("interleave format not supported by the platform"));
        }
    }
    Ok(())
}

fn is_uniform_compatible(
    inventory: &DimmInventory,
    sets: &[InterleaveSet],
    id: DimmId,
    layout: UniformLayout,
) -> bool {
    let Some(dimm) = inventory.get(id) else {
        return false;
    };
    if !dimm.config.configured {
        return false;
    }
    match layout {
        UniformLayout::AppDirectNotInterleaved => {
            dimm.config.mapped_volatile_capacity == 0
                && dimm.config.interleave_sets.iter().all(|index| {
                    sets.iter()
                        .find(|set| set.index == *index)
                        .is_some_and(|set| set.dimms_num() == 1)
                })
        }
        UniformLayout::Volatile => {
            dimm.config.mapped_persistent_capacity == 0 && dimm.config.mapped_volatile_capacity > 0
        }
    }
}

/// All-or-nothing rule for creating goals on a socket
///
/// A socket touched by the request must have either all its unconfigured
/// modules specified, or all its modules. Uniform layouts may also leave
/// out modules already configured the same way.
pub fn verify_creating_supported_region_configs(
    inventory: &DimmInventory,
    sets: &[InterleaveSet],
    dimms: &[DimmId],
    uniform: Option<UniformLayout>,
    status: &mut CommandStatus,
) -> Result<()> {
    for socket in inventory.sockets() {
        let (mut configured, mut unconfigured) = (0usize, 0usize);
        let (mut specified_configured, mut specified_unconfigured) = (0usize, 0usize);
        for dimm in inventory.manageable_on_socket(socket) {
            let specified = dimms.contains(&dimm.id);
            match (dimm.config.configured, specified) {
                (true, true) => {
                    configured += 1;
                    specified_configured += 1;
                }
                (true, false) => configured += 1,
                (false, true) => {
                    unconfigured += 1;
                    specified_unconfigured += 1;
                }
                (false, false) => unconfigured += 1,
            }
        }

        let supported = (specified_configured == 0 && specified_unconfigured == 0)
            || (specified_configured == 0 && specified_unconfigured == unconfigured)
            || (specified_configured == configured && specified_unconfigured == unconfigured);
        if supported {
            continue;
        }

        let relaxed = uniform.is_some_and(|layout| {
            inventory
                .manageable_on_socket(socket)
                .filter(|dimm| !dimms.contains(&dimm.id))
                .all(|dimm| is_uniform_compatible(inventory, sets, dimm.id, layout))
        });
        if !relaxed {
            pmem_debug!("Socket {}: request covers a partial set of modules", socket);
            status.set(NvmStatusCode::RegionConfUnsupportedConfig);
            return Err(unsupported("request must cover all unconfigured or all modules on a socket"));
        }
    }
    Ok(())
}

/// All-or-nothing rule for deleting goals on a socket
pub fn verify_deleting_supported_region_configs(
    inventory: &DimmInventory,
    dimms: &[DimmId],
    status: &mut CommandStatus,
) -> Result<()> {
    for socket in inventory.sockets() {
        let with_goal = inventory
            .manageable_on_socket(socket)
            .filter(|dimm| dimm.goal.regions_goal_config);
        let (mut total, mut specified) = (0usize, 0usize);
        for dimm in with_goal {
            total += 1;
            if dimms.contains(&dimm.id) {
                specified += 1;
            }
        }
        if specified != 0 && specified != total {
            status.set(NvmStatusCode::RegionConfUnsupportedConfig);
            return Err(unsupported("every module with a goal on the socket must be specified"));
        }
    }
    Ok(())
}

/// Rejects a request whose current sets or goals reach unspecified modules
pub fn validate_regions_correlations(
    inventory: &DimmInventory,
    arena: &GoalArena,
    sets: &[InterleaveSet],
    dimms: &[DimmId],
    status: &mut CommandStatus,
) -> Result<()> {
    let mut last = None;

    let by_regions = find_related_dimms_by_regions(inventory, sets, dimms)?;
    for id in by_regions.iter().filter(|id| !dimms.contains(id)) {
        let code = NvmStatusCode::RegionCurrConfAffectsUnspecDimm;
        status.set_object_status(ObjectId::Dimm(*id), code);
        last = Some(code);
    }

    let by_goals = find_related_dimms_by_goals(inventory, arena, dimms)?;
    for id in by_goals.iter().filter(|id| !dimms.contains(id)) {
        let object = ObjectId::Dimm(*id);
        let code = if status.has_object_status(object) {
            NvmStatusCode::RegionGoalCurrConfAffectsUnspecDimm
        } else {
            NvmStatusCode::RegionGoalConfAffectsUnspecDimm
        };
        status.set_object_status(object, code);
        last = Some(code);
    }

    match last {
        Some(code) => {
            status.set(code);
            Err(invalid_parameter("configuration affects unspecified modules"))
        }
        None => Ok(()),
    }
}

/// Checks each module's SKU enables what the staged goals use
pub fn verify_sku_support_for_create_goal(
    inventory: &DimmInventory,
    changeset: &GoalChangeset,
    status: &mut CommandStatus,
) -> Result<()> {
    for (id, volatile_size) in changeset.specified() {
        let dimm = inventory.require(*id)?;
        let has_goals = changeset.goals().iter().any(|goal| goal.contains(*id));
        let volatile_violated = *volatile_size > 0 && !dimm.sku.contains(SkuCapabilities::MEMORY_MODE);
        let app_direct_violated = has_goals && !dimm.sku.contains(SkuCapabilities::APP_DIRECT_MODE);
        if volatile_violated || app_direct_violated {
            status.set_object_status_and_general(ObjectId::Dimm(*id), NvmStatusCode::ConfigNotSupportedByCurrentSku);
            return Err(aborted("configuration not supported by the module SKU"));
        }
    }
    Ok(())
}

/// Checks explicit AppDirect granularity exists on the platform
///
/// iMC and channel sizes must both be default or both explicit.
pub fn app_direct_settings_validation(
    platform: &PlatformCapabilities,
    preferences: &DriverPreferences,
) -> Result<()> {
    if preferences.imc_interleaving.is_default() != preferences.channel_interleaving.is_default() {
        return Err(invalid_parameter("iMC and channel interleave sizes must both be set or both default"));
    }
    let capability = platform
        .pm_direct_capability()
        .map_err(|_| aborted("memory interleave capability table missing"))?;

    let imc = preferences.imc_interleaving;
    if !imc.is_default() && !capability.formats.iter().any(|format| format.imc.intersects(imc)) {
        return Err(invalid_parameter("iMC interleave size not supported"));
    }
    let channel = preferences.channel_interleaving;
    if !channel.is_default() && !capability.formats.iter().any(|format| format.channel.intersects(channel)) {
        return Err(invalid_parameter("channel interleave size not supported"));
    }
    Ok(())
}

/// Whether the preferences differ from AppDirect sets kept outside the request
///
/// Sets on the requested modules are replaced and never conflict.
pub fn app_direct_settings_conflict(
    inventory: &DimmInventory,
    platform: &PlatformCapabilities,
    sets: &[InterleaveSet],
    preferences: &DriverPreferences,
    requested: &[DimmId],
    status: &mut CommandStatus,
) -> Result<bool> {
    let capability = platform
        .pm_direct_capability()
        .map_err(|_| aborted("memory interleave capability table missing"))?;
    let (imc, channel) = if preferences.is_default() {
        capability
            .recommended()
            .map(|format| (format.imc, format.channel))
            .unwrap_or((InterleaveSize::DEFAULT, InterleaveSize::DEFAULT))
    } else {
        (preferences.imc_interleaving, preferences.channel_interleaving)
    };

    let conflict = inventory
        .manageable()
        .filter(|dimm| dimm.config.configured && !requested.contains(&dimm.id))
        .flat_map(|dimm| dimm.config.interleave_sets.iter())
        .filter_map(|index| sets.iter().find(|set| set.index == *index))
        .any(|set| {
            !set.format.channel_ways.is_empty()
                && (set.format.imc_interleaving != imc || set.format.channel_interleaving != channel)
        });
    if conflict {
        status.set(NvmStatusCode::AppdirectInSystem);
    }
    Ok(conflict)
}

/// Checks the near-memory to far-memory ratio of a socket
///
/// Near memory is the socket's DDR from the PMTT; without a PMTT the SKU
/// caching size stands in and an advisory is recorded. Far memory below
/// near memory fails; a ratio outside the recommended window only warns.
pub fn verify_nm_fm_ratio(
    platform: &PlatformCapabilities,
    policy: &NmFmRatioPolicy,
    socket: SocketId,
    far_memory: u64,
    status: &mut CommandStatus,
) -> Result<()> {
    if !policy.enabled || far_memory == 0 {
        return Ok(());
    }
    let object = ObjectId::Socket(socket);
    let near_memory = match platform.ddr_capacity(socket) {
        Some(capacity) => capacity,
        None => {
            status.set_object_status(object, NvmStatusCode::WarnPmttTableMissing);
            platform.socket_sku(socket).map(|sku| sku.caching_memory_size).unwrap_or(0)
        }
    };
    if near_memory == 0 {
        return Ok(());
    }

    if far_memory < near_memory {
        status.set_object_status_and_general(object, NvmStatusCode::ErrNmFmRatioGreaterThanOne);
        return Err(unsupported("near memory exceeds far memory"));
    }
    if far_memory < near_memory.saturating_mul(policy.lower_bound) {
        pmem_warn!("Socket {}: NM:FM ratio above recommended window", socket);
        status.set_object_status(object, NvmStatusCode::WarnNmFmRatioUpperViolation);
    } else if far_memory > near_memory.saturating_mul(policy.upper_bound) {
        pmem_warn!("Socket {}: NM:FM ratio below recommended window", socket);
        status.set_object_status(object, NvmStatusCode::WarnNmFmRatioLowerViolation);
    }
    Ok(())
}

/// Decodes a raw persistent memory type
pub fn persistent_memory_type_validation(raw: u8) -> Result<PersistentMemoryType> {
    PersistentMemoryType::try_from(raw)
}

/// Removes and returns the reserve module (the last requested one)
pub fn select_reserve_dimm(
    dimms: &mut Vec<DimmId>,
    requires_two: bool,
    status: &mut CommandStatus,
) -> Result<DimmId> {
    if requires_two && dimms.len() < 2 {
        status.set(NvmStatusCode::ReserveDimmRequiresAtLeastTwoDimms);
        return Err(invalid_parameter("a reserve module needs at least two modules"));
    }
    dimms.pop().ok_or_else(|| invalid_parameter("no module to reserve"))
}

/// Checks a socket stays within the per-die interleave set count
pub fn verify_max_pm_interleave_sets(
    platform: &PlatformCapabilities,
    socket: SocketId,
    new_sets: usize,
    surviving_sets: usize,
    status: &mut CommandStatus,
) -> Result<()> {
    let Some(limits) = platform.max_pm_interleave_sets else {
        return Ok(());
    };
    if new_sets + surviving_sets > usize::from(limits.per_die) {
        status.set_object_status_and_general(
            ObjectId::Socket(socket),
            NvmStatusCode::ErrRegionMaxPmInterleaveSetsExceeded,
        );
        return Err(Error::Unsupported("too many persistent interleave sets on the socket".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimm::{Dimm, DimmLocation};
    use crate::goal::RegionGoalTemplate;
    use crate::platform::{ChannelWays, MaxPmInterleaveSets, PlatformCapabilityInfo, SocketDdr};
    use alloc::vec;
    use pmem_api::{DimmUid, GIB};

    fn inventory(configured: &[bool]) -> DimmInventory {
        let dimms = configured
            .iter()
            .enumerate()
            .map(|(n, configured)| {
                let location = DimmLocation { socket: SocketId(0), imc: 0, channel: n as u8, channel_position: 0 };
                let mut dimm = Dimm::new(DimmId(n as u32 + 1), DimmUid::default(), location, 128 * GIB);
                dimm.config.configured = *configured;
                dimm
            })
            .collect();
        DimmInventory::new(dimms).unwrap()
    }

    fn goal(size: u64, dimms: usize) -> RegionGoal {
        let template = RegionGoalTemplate { set_type: InterleaveSetType::Interleaved, asymmetrical: false };
        let ids = (1..=dimms as u32).map(DimmId).collect();
        let mut next = 1;
        crate::goal::create_goal(&template, ids, size, None, 0, &mut next).unwrap()
    }

    #[test]
    fn test_platform_support() {
        let mut platform = PlatformCapabilities::default();
        let mut status = CommandStatus::new();
        assert!(verify_platform_support(&platform, GIB, PersistentMemoryType::AppDirect, &mut status).is_ok());

        platform.platform = Some(PlatformCapabilityInfo {
            mgmt_sw_config_input: true,
            memory_modes: MemoryModes::APP_DIRECT,
        });
        let result = verify_platform_support(&platform, GIB, PersistentMemoryType::AppDirect, &mut status);
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert_eq!(status.general, NvmStatusCode::PlatformNotSupport2lmMode);

        platform.platform = None;
        let result = verify_platform_support(&platform, 0, PersistentMemoryType::Storage, &mut status);
        assert!(matches!(result, Err(Error::LoadError(_))));
    }

    #[test]
    fn test_default_sizes_adopt_recommended() {
        let platform = PlatformCapabilities::default();
        let mut goals = vec![goal(512 * GIB, 4)];
        let mut status = CommandStatus::new();
        verify_interleave_sets_platform_support(&platform, &mut goals, &mut status).unwrap();
        assert_eq!(goals[0].imc_interleaving, InterleaveSize::SIZE_4KB);
        assert_eq!(goals[0].channel_interleaving, InterleaveSize::SIZE_4KB);
    }

    #[test]
    fn test_explicit_sizes_must_match() {
        let platform = PlatformCapabilities::default();
        let mut goals = vec![goal(4 * GIB, 4)];
        goals[0].imc_interleaving = InterleaveSize::SIZE_256B;
        goals[0].channel_interleaving = InterleaveSize::SIZE_256B;
        let mut status = CommandStatus::new();
        assert!(verify_interleave_sets_platform_support(&platform, &mut goals, &mut status).is_err());
        assert_eq!(status.general, NvmStatusCode::PlatformNotSupportSpecifiedIntSizes);
    }

    #[test]
    fn test_alignment_and_zero_size() {
        let platform = PlatformCapabilities::default();
        let mut status = CommandStatus::new();
        let mut goals = vec![goal(3 * GIB, 2)];
        assert!(matches!(
            verify_interleave_sets_platform_support(&platform, &mut goals, &mut status),
            Err(Error::Aborted(_))
        ));
        let mut goals = vec![goal(0, 2)];
        assert!(verify_interleave_sets_platform_support(&platform, &mut goals, &mut status).is_err());
        assert_eq!(status.general, NvmStatusCode::RegionSizeTooSmallForIntSetAlignment);
    }

    #[test]
    fn test_unsupported_width() {
        let platform = PlatformCapabilities::default();
        let mut goals = vec![goal(5 * GIB, 5)];
        assert!(goals[0].channel_ways.is_empty());
        let mut status = CommandStatus::new();
        assert!(verify_interleave_sets_platform_support(&platform, &mut goals, &mut status).is_err());
        assert_eq!(status.general, NvmStatusCode::PlatformNotSupportDefaultIntSizes);
    }

    #[test]
    fn test_creating_rules() {
        let inv = inventory(&[true, true, false, false]);
        let mut status = CommandStatus::new();
        let sets: Vec<InterleaveSet> = Vec::new();
        // unconfigured only
        assert!(verify_creating_supported_region_configs(&inv, &sets, &[DimmId(3), DimmId(4)], None, &mut status).is_ok());
        // everything
        let all = [DimmId(1), DimmId(2), DimmId(3), DimmId(4)];
        assert!(verify_creating_supported_region_configs(&inv, &sets, &all, None, &mut status).is_ok());
        // partial
        let result = verify_creating_supported_region_configs(&inv, &sets, &[DimmId(1), DimmId(3)], None, &mut status);
        assert!(matches!(result, Err(Error::Unsupported(_))));
        assert_eq!(status.general, NvmStatusCode::RegionConfUnsupportedConfig);
    }

    #[test]
    fn test_creating_relaxed_for_volatile() {
        let mut inv = inventory(&[true, true, false]);
        for id in [DimmId(1), DimmId(2)] {
            inv.require_mut(id).unwrap().config.mapped_volatile_capacity = 128 * GIB;
        }
        let sets: Vec<InterleaveSet> = Vec::new();
        let mut status = CommandStatus::new();
        let request = [DimmId(1), DimmId(3)];
        assert!(verify_creating_supported_region_configs(&inv, &sets, &request, None, &mut status).is_err());
        let mut status = CommandStatus::new();
        assert!(
            verify_creating_supported_region_configs(&inv, &sets, &request, Some(UniformLayout::Volatile), &mut status)
                .is_ok()
        );
    }

    #[test]
    fn test_deleting_rules() {
        let mut inv = inventory(&[false, false]);
        for id in [DimmId(1), DimmId(2)] {
            inv.require_mut(id).unwrap().goal.regions_goal_config = true;
        }
        let mut status = CommandStatus::new();
        assert!(verify_deleting_supported_region_configs(&inv, &[DimmId(1)], &mut status).is_err());
        assert!(verify_deleting_supported_region_configs(&inv, &[DimmId(1), DimmId(2)], &mut status).is_ok());
    }

    #[test]
    fn test_sku_support() {
        let mut inv = inventory(&[false]);
        inv.require_mut(DimmId(1)).unwrap().sku = SkuCapabilities::APP_DIRECT_MODE;
        let mut changeset = GoalChangeset::new();
        changeset.specify(DimmId(1), 16 * GIB);
        let mut status = CommandStatus::new();
        assert!(verify_sku_support_for_create_goal(&inv, &changeset, &mut status).is_err());
        assert!(status.contains(NvmStatusCode::ConfigNotSupportedByCurrentSku));
    }

    #[test]
    fn test_app_direct_settings() {
        let platform = PlatformCapabilities::default();
        assert!(app_direct_settings_validation(&platform, &DriverPreferences::default()).is_ok());
        let half = DriverPreferences::explicit(InterleaveSize::SIZE_4KB, InterleaveSize::DEFAULT);
        assert!(app_direct_settings_validation(&platform, &half).is_err());
        let odd = DriverPreferences::explicit(InterleaveSize::SIZE_1GB, InterleaveSize::SIZE_4KB);
        assert!(app_direct_settings_validation(&platform, &odd).is_err());
    }

    #[test]
    fn test_app_direct_conflict_ignores_requested() {
        let mut inv = inventory(&[true, true]);
        inv.require_mut(DimmId(1)).unwrap().config.interleave_sets = vec![1];
        let mut set = InterleaveSet::new(1, SocketId(0));
        set.format.channel_ways = ChannelWays::WAYS_1;
        set.format.imc_interleaving = InterleaveSize::SIZE_256B;
        set.format.channel_interleaving = InterleaveSize::SIZE_256B;
        let sets = vec![set];
        let platform = PlatformCapabilities::default();
        let prefs = DriverPreferences::default();
        let mut status = CommandStatus::new();
        assert!(!app_direct_settings_conflict(&inv, &platform, &sets, &prefs, &[DimmId(1)], &mut status).unwrap());
        assert!(app_direct_settings_conflict(&inv, &platform, &sets, &prefs, &[DimmId(2)], &mut status).unwrap());
        assert_eq!(status.general, NvmStatusCode::AppdirectInSystem);
    }

    #[test]
    fn test_nm_fm_ratio() {
        let mut platform = PlatformCapabilities::default();
        platform.pmtt = Some(vec![SocketDdr { socket: SocketId(0), capacity: 64 * GIB }]);
        let policy = NmFmRatioPolicy::default();
        let mut status = CommandStatus::new();

        assert!(verify_nm_fm_ratio(&platform, &policy, SocketId(0), 32 * GIB, &mut status).is_err());
        assert!(status.contains(NvmStatusCode::ErrNmFmRatioGreaterThanOne));

        let mut status = CommandStatus::new();
        verify_nm_fm_ratio(&platform, &policy, SocketId(0), 128 * GIB, &mut status).unwrap();
        assert!(status.contains(NvmStatusCode::WarnNmFmRatioUpperViolation));

        let mut status = CommandStatus::new();
        verify_nm_fm_ratio(&platform, &policy, SocketId(0), 2048 * GIB, &mut status).unwrap();
        assert!(status.contains(NvmStatusCode::WarnNmFmRatioLowerViolation));

        let mut status = CommandStatus::new();
        verify_nm_fm_ratio(&platform, &policy, SocketId(0), 512 * GIB, &mut status).unwrap();
        assert!(status.objects.is_empty());
    }

    #[test]
    fn test_pmtt_missing_falls_back() {
        let platform = PlatformCapabilities::default();
        let mut status = CommandStatus::new();
        verify_nm_fm_ratio(&platform, &NmFmRatioPolicy::default(), SocketId(0), 64 * GIB, &mut status).unwrap();
        assert!(status.contains(NvmStatusCode::WarnPmttTableMissing));
    }

    #[test]
    fn test_reserve_dimm_and_type() {
        let mut status = CommandStatus::new();
        let mut dimms = vec![DimmId(1)];
        assert!(select_reserve_dimm(&mut dimms, true, &mut status).is_err());
        assert_eq!(status.general, NvmStatusCode::ReserveDimmRequiresAtLeastTwoDimms);
        let mut dimms = vec![DimmId(1), DimmId(2)];
        assert_eq!(select_reserve_dimm(&mut dimms, true, &mut status).unwrap(), DimmId(2));
        assert_eq!(dimms, vec![DimmId(1)]);

        assert_eq!(persistent_memory_type_validation(0x2).unwrap(), PersistentMemoryType::AppDirectNotInterleaved);
        assert!(persistent_memory_type_validation(0x3).is_err());
    }

    #[test]
    fn test_max_pm_interleave_sets() {
        let mut platform = PlatformCapabilities::default();
        platform.max_pm_interleave_sets = Some(MaxPmInterleaveSets { per_die: 2, per_dcpmm: 2 });
        let mut status = CommandStatus::new();
        assert!(verify_max_pm_interleave_sets(&platform, SocketId(0), 2, 0, &mut status).is_ok());
        assert!(verify_max_pm_interleave_sets(&platform, SocketId(0), 2, 1, &mut status).is_err());
        assert!(status.contains(NvmStatusCode::ErrRegionMaxPmInterleaveSetsExceeded));
    }
}
