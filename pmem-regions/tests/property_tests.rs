//! Property-based tests for the planner

use proptest::prelude::*;

use pmem_api::{CommandStatus, DimmId, DimmUid, Error, NvmStatusCode, ObjectId, Result, SocketId, GIB};
use pmem_regions::dimm::{Dimm, DimmInventory, DimmLocation};
use pmem_regions::goal::{RegionGoalDimm, next_interleave_set_index};
use pmem_regions::orchestrator::{CreateGoalRequest, RegionContext, create_goal_config};
use pmem_regions::pcd::{
    CurrentConfig, DimmConfigStatus, DimmIdentifier, IdentificationInfo, InterleaveChangeStatus,
    InterleaveInformation, PcatTable, PcdRevision, PlatformConfigData, PlatformConfigSource,
};
use pmem_regions::platform::{ChannelWays, InterleaveSize, PlatformCapabilities, SocketSku};
use pmem_regions::reconstruct::{NfitTables, RegionMapping, SpaRange, SpaRangeKind};
use pmem_regions::reduce::{SocketRequest, reduce_app_direct, reduce_for_socket_sku, reduce_volatile};
use pmem_regions::region::IsState;
use pmem_regions::template::CapacitySplit;
use pmem_regions::{Alignments, EngineConfig, PersistentMemoryType};

/// Slots of a 2x3 socket as (iMC, channel)
const SLOTS: [(u8, u8); 6] = [(0, 0), (1, 0), (0, 1), (1, 1), (0, 2), (1, 2)];

fn context(capacities: &[u64]) -> RegionContext {
    let dimms = capacities
        .iter()
        .zip(SLOTS)
        .enumerate()
        .map(|(n, (capacity, (imc, channel)))| {
            let id = n as u32 + 1;
            let uid = DimmUid { vendor_id: 0x8089, serial_number: 0x9000 + id, ..Default::default() };
            let location = DimmLocation { socket: SocketId(0), imc, channel, channel_position: 0 };
            Dimm::new(DimmId(id), uid, location, *capacity)
        })
        .collect();
    RegionContext::new(
        DimmInventory::new(dimms).unwrap(),
        PlatformCapabilities::default(),
        EngineConfig::default(),
    )
}

fn capacities() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec((2u64..=16).prop_map(|units| units * 32 * GIB), 1..=6)
}

fn pm_type() -> impl Strategy<Value = PersistentMemoryType> {
    prop_oneof![
        Just(PersistentMemoryType::AppDirect),
        Just(PersistentMemoryType::AppDirectNotInterleaved),
    ]
}

fn is_state() -> impl Strategy<Value = IsState> {
    prop_oneof![
        Just(IsState::Healthy),
        Just(IsState::SpaMissing),
        Just(IsState::ConfigInactive),
        Just(IsState::DimmMissing),
        Just(IsState::InitFailure),
    ]
}

struct CurrentConfigs(Vec<(DimmId, PlatformConfigData)>);

impl PlatformConfigSource for CurrentConfigs {
    fn platform_config(&self, dimm: DimmId) -> Result<Option<PlatformConfigData>> {
        Ok(self.0.iter().find(|(id, _)| *id == dimm).map(|(_, data)| data.clone()))
    }
}

/// Current configs describing one interleave set per pair of modules
fn paired_sets(ctx: &RegionContext) -> CurrentConfigs {
    let ids = ctx.inventory.ids();
    let mut configs = Vec::new();
    for (pair, members) in ids.chunks(2).enumerate() {
        let info = InterleaveInformation {
            interleave_set_index: pair as u16 + 1,
            num_dimms: members.len() as u8,
            channel_ways: ChannelWays::from_dimm_count(members.len()),
            imc_interleaving: InterleaveSize::SIZE_4KB,
            channel_interleaving: InterleaveSize::SIZE_4KB,
            mirror: false,
            status: InterleaveChangeStatus::Success,
            identifications: members
                .iter()
                .map(|id| IdentificationInfo {
                    dimm: DimmIdentifier::for_dimm(ctx.inventory.get(*id).unwrap(), PcdRevision::V2),
                    partition_offset: 0,
                    partition_size: 32 * GIB,
                })
                .collect(),
        };
        for id in members {
            let current = CurrentConfig {
                status: DimmConfigStatus::Success,
                volatile_memory_size: 0,
                persistent_memory_size: 32 * GIB,
                tables: vec![PcatTable::InterleaveInformation(info.clone())],
            };
            configs.push((*id, PlatformConfigData { current: Some(current), input: None, output: None }));
        }
    }
    CurrentConfigs(configs)
}

/// NFIT ranges mapping the sets of [`paired_sets`], one range per pair
fn paired_nfit(ctx: &RegionContext) -> NfitTables {
    let ids = ctx.inventory.ids();
    let mut nfit = NfitTables::new();
    for (pair, members) in ids.chunks(2).enumerate() {
        let index = pair as u16 + 1;
        nfit.spa_ranges.push(SpaRange {
            index,
            kind: SpaRangeKind::PersistentMemory,
            base: u64::from(index) << 40,
            length: 32 * GIB * members.len() as u64,
        });
        for (n, id) in members.iter().enumerate() {
            nfit.region_mappings.push(RegionMapping {
                dimm: *id,
                spa_range_index: index,
                region_offset: n as u64 * 4096,
                dpa: 0,
                length: 32 * GIB,
                interleave_ways: members.len() as u16,
            });
        }
    }
    nfit
}

/// Ways a module can drop out of an already reconstructed layout
#[derive(Debug, Clone, Copy)]
enum Fault {
    LostIdentification,
    LostMapping,
    InactiveConfig,
}

fn fault() -> impl Strategy<Value = Fault> {
    prop_oneof![
        Just(Fault::LostIdentification),
        Just(Fault::LostMapping),
        Just(Fault::InactiveConfig),
    ]
}

fn inject(fault: Fault, victim: DimmId, ctx: &RegionContext, source: &mut CurrentConfigs, nfit: &mut NfitTables) {
    match fault {
        Fault::LostIdentification => {
            let identity = DimmIdentifier::for_dimm(ctx.inventory.get(victim).unwrap(), PcdRevision::V2);
            for (_, data) in source.0.iter_mut() {
                for table in data.current.iter_mut().flat_map(|current| current.tables.iter_mut()) {
                    if let PcatTable::InterleaveInformation(info) = table {
                        info.identifications.retain(|identification| identification.dimm != identity);
                    }
                }
            }
        }
        Fault::LostMapping => nfit.region_mappings.retain(|mapping| mapping.dimm != victim),
        Fault::InactiveConfig => {
            for (_, data) in source.0.iter_mut().filter(|(id, _)| *id == victim) {
                if let Some(current) = data.current.as_mut() {
                    current.status = DimmConfigStatus::NewDimm;
                }
            }
        }
    }
}

fn total_mapped(split: &CapacitySplit) -> u64 {
    split.symmetrical.iter().map(|dimm| dimm.region_size + dimm.volatile_size).sum::<u64>()
        + split.asymmetrical.iter().map(|dimm| dimm.region_size).sum::<u64>()
}

fn sku_platform(limit: u64, mapped_elsewhere: u64) -> PlatformCapabilities {
    let mut platform = PlatformCapabilities::default();
    platform.socket_skus.push(SocketSku {
        socket: SocketId(0),
        mapped_memory_limit: limit,
        total_memory_mapped_to_spa: mapped_elsewhere,
        caching_memory_size: 0,
    });
    platform
}

proptest! {
    #[test]
    fn prop_goal_indices_unique_and_increasing(
        capacities in capacities(),
        requests in prop::collection::vec((0u32..=100, pm_type()), 1..=3),
        surviving in 0u16..=8,
    ) {
        let mut ctx = context(&capacities);
        if surviving > 0 {
            ctx.inventory.require_mut(DimmId(1)).unwrap().config.interleave_sets.push(surviving);
        }
        for (volatile_percent, pm_type) in requests {
            let in_use = ctx
                .arena
                .iter()
                .map(|(_, goal)| goal.interleave_set_index)
                .chain(ctx.inventory.iter().flat_map(|dimm| dimm.config.interleave_sets.iter().copied()))
                .max()
                .unwrap_or(0);
            let first = next_interleave_set_index(&ctx.inventory, &ctx.arena).unwrap();
            prop_assert!(first > in_use);

            let mut status = CommandStatus::new();
            let request = CreateGoalRequest::new().with_volatile_percent(volatile_percent).with_pm_type(pm_type);
            if let Ok(plan) = create_goal_config(&mut ctx, &request, &mut status) {
                let mut indices: Vec<u16> = ctx.arena.iter().map(|(_, goal)| goal.interleave_set_index).collect();
                indices.sort_unstable();
                let count = indices.len();
                indices.dedup();
                prop_assert_eq!(indices.len(), count);
                prop_assert!(indices.iter().all(|index| *index >= first && *index < plan.next_interleave_set_index));
            }
        }
    }

    #[test]
    fn prop_goals_fit_module_capacity(
        capacities in capacities(),
        volatile_percent in 0u32..=100,
        reserved_percent in 0u32..=50,
        pm_type in pm_type(),
    ) {
        prop_assume!(volatile_percent + reserved_percent <= 100);
        let mut ctx = context(&capacities);
        let mut status = CommandStatus::new();
        let request = CreateGoalRequest::new()
            .with_volatile_percent(volatile_percent)
            .with_reserved_percent(reserved_percent)
            .with_pm_type(pm_type);
        if create_goal_config(&mut ctx, &request, &mut status).is_ok() {
            for dimm in ctx.inventory.iter() {
                let persistent: u64 = dimm
                    .goal_handles()
                    .filter_map(|handle| ctx.arena.get(handle))
                    .map(|goal| goal.size_per_dimm())
                    .sum();
                prop_assert!(persistent + dimm.goal.volatile_size_goal <= dimm.raw_capacity);
            }
        }
    }

    #[test]
    fn prop_health_never_improves(first in is_state(), second in is_state()) {
        let promoted = first.promote(second);
        prop_assert!(promoted >= first);
        prop_assert!(promoted >= second);
        prop_assert_eq!(promoted.promote(IsState::Healthy), promoted);
    }

    #[test]
    fn prop_app_direct_reducer_terminates(
        sizes in prop::collection::vec(0u64..=16, 1..=6),
        excess_units in 0u64..=128,
    ) {
        let mut dimms: Vec<RegionGoalDimm> = sizes
            .iter()
            .enumerate()
            .map(|(n, units)| RegionGoalDimm {
                dimm: DimmId(n as u32 + 1),
                region_size: units * GIB,
                volatile_size: 0,
            })
            .collect();
        let before: u64 = dimms.iter().map(|dimm| dimm.region_size).sum();
        let requested = excess_units * GIB;
        let mut excess = requested;

        let result = reduce_app_direct(&mut excess, &mut dimms, GIB);
        let after: u64 = dimms.iter().map(|dimm| dimm.region_size).sum();
        prop_assert!(after <= before);
        prop_assert!(dimms.iter().all(|dimm| dimm.region_size % GIB == 0));
        match result {
            Ok(()) => prop_assert!(before - after >= requested),
            Err(Error::CapacityExhausted(left)) => {
                prop_assert_eq!(after, 0);
                prop_assert_eq!(left, requested - before);
            }
            Err(_) => prop_assert!(excess > 0),
        }
    }

    #[test]
    fn prop_reconstruction_is_idempotent(count in 1usize..=6) {
        let capacities = vec![128 * GIB; count];
        let mut ctx = context(&capacities);
        let source = paired_sets(&ctx);
        let nfit = NfitTables::new();

        let mut status = CommandStatus::new();
        ctx.reconstruct(&source, &nfit, &mut status).unwrap();
        let first_sets = ctx.sets.clone();
        let first_members: Vec<Vec<u16>> =
            ctx.inventory.iter().map(|dimm| dimm.config.interleave_sets.clone()).collect();

        ctx.reconstruct(&source, &nfit, &mut status).unwrap();
        prop_assert_eq!(&ctx.sets, &first_sets);
        let members: Vec<Vec<u16>> = ctx.inventory.iter().map(|dimm| dimm.config.interleave_sets.clone()).collect();
        prop_assert_eq!(members, first_members);
        prop_assert_eq!(first_sets.len(), count.div_ceil(2));
    }

    #[test]
    fn prop_degraded_reconstruction_never_heals(
        count in 1usize..=6,
        faults in prop::collection::vec((0usize..6, fault()), 1..=4),
    ) {
        let mut ctx = context(&vec![128 * GIB; count]);
        let mut source = paired_sets(&ctx);
        let mut nfit = paired_nfit(&ctx);
        let mut status = CommandStatus::new();
        ctx.reconstruct(&source, &nfit, &mut status).unwrap();
        prop_assert!(ctx.sets.iter().all(|set| set.state() == IsState::Healthy));

        for (victim, fault) in faults {
            let previous: Vec<(u16, IsState)> = ctx.sets.iter().map(|set| (set.index, set.state())).collect();
            let victim = DimmId((victim % count) as u32 + 1);
            inject(fault, victim, &ctx, &mut source, &mut nfit);

            // a degraded layout may disagree with the NFIT; the current-config view is kept
            let mut status = CommandStatus::new();
            let _ = ctx.reconstruct(&source, &nfit, &mut status);
            prop_assert_eq!(ctx.sets.len(), previous.len());
            for (index, state) in previous {
                let set = ctx.interleave_set(index).unwrap();
                prop_assert!(set.state() >= state, "set {} went from {:?} to {:?}", index, state, set.state());
            }
            let degraded = ctx.interleave_set((victim.0 as u16 + 1) / 2).unwrap();
            prop_assert!(degraded.state() > IsState::Healthy);
        }
    }

    #[test]
    fn prop_volatile_reducer_settles(
        sizes in prop::collection::vec(0u64..=16, 1..=6),
        excess_units in 0u64..=128,
    ) {
        let mut dimms: Vec<RegionGoalDimm> = sizes
            .iter()
            .enumerate()
            .map(|(n, units)| RegionGoalDimm {
                dimm: DimmId(n as u32 + 1),
                region_size: 0,
                volatile_size: units * GIB,
            })
            .collect();
        let available: u64 = dimms.iter().map(|dimm| dimm.volatile_size).sum();
        let requested = excess_units * GIB;
        let mut excess = requested;

        let result = reduce_volatile(&mut excess, &mut dimms, GIB);
        let left: u64 = dimms.iter().map(|dimm| dimm.volatile_size).sum();
        prop_assert!(dimms.iter().all(|dimm| dimm.volatile_size % GIB == 0));
        if requested <= available {
            prop_assert_eq!(result, Ok(()));
            prop_assert_eq!(excess, 0);
            prop_assert!(available - left >= requested);
        } else {
            prop_assert_eq!(result, Err(Error::CapacityExhausted(requested - available)));
            prop_assert_eq!(left, 0);
            prop_assert!(dimms.is_empty());
        }
    }

    #[test]
    fn prop_sku_reduction_fits_limit(
        shares in prop::collection::vec((0u64..=8, 0u64..=8, 0u64..=2), 1..=6),
        limit_units in 0u64..=64,
    ) {
        let ctx = context(&vec![512 * GIB; shares.len()]);
        let ids = ctx.inventory.ids();
        let mut split = CapacitySplit::default();
        for (id, (region, volatile, asymmetric)) in ids.iter().zip(&shares) {
            split.symmetrical.push(RegionGoalDimm {
                dimm: *id,
                region_size: region * 16 * GIB,
                volatile_size: volatile * 16 * GIB,
            });
            if *asymmetric > 0 {
                split.asymmetrical.push(RegionGoalDimm {
                    dimm: *id,
                    region_size: asymmetric * 16 * GIB,
                    volatile_size: 0,
                });
            }
        }
        let before = split.clone();
        let limit = limit_units * 16 * GIB;
        let platform = sku_platform(limit, 0);
        let mut status = CommandStatus::new();

        let request = SocketRequest { socket: SocketId(0), dimms: &ids };
        reduce_for_socket_sku(&ctx.inventory, &platform, &Alignments::default(), &request, &mut split, &mut status)
            .unwrap();
        let warned = status
            .object_codes(ObjectId::Socket(SocketId(0)))
            .any(|code| code == NvmStatusCode::WarnMappedMemReducedDueToCpuSku);
        if total_mapped(&before) <= limit {
            prop_assert_eq!(&split, &before);
            prop_assert!(!warned);
        } else {
            prop_assert!(warned);
            prop_assert!(total_mapped(&split) <= limit);
            prop_assert!(!split.symmetrical.is_empty());
        }
    }

    #[test]
    fn prop_sku_reduction_exhausts_app_direct(
        regions in prop::collection::vec(1u64..=8, 1..=6),
        limit_units in 0u64..=8,
        elsewhere_units in 1u64..=8,
    ) {
        let ctx = context(&vec![512 * GIB; regions.len()]);
        let ids = ctx.inventory.ids();
        let mut split = CapacitySplit::default();
        for (id, units) in ids.iter().zip(&regions) {
            split.symmetrical.push(RegionGoalDimm { dimm: *id, region_size: units * 16 * GIB, volatile_size: 0 });
        }
        // memory mapped outside the request already exceeds the ceiling
        let elsewhere = (limit_units + elsewhere_units) * 16 * GIB;
        let platform = sku_platform(limit_units * 16 * GIB, elsewhere);
        let mut status = CommandStatus::new();

        let request = SocketRequest { socket: SocketId(0), dimms: &ids };
        reduce_for_socket_sku(&ctx.inventory, &platform, &Alignments::default(), &request, &mut split, &mut status)
            .unwrap();
        prop_assert_eq!(total_mapped(&split), 0);
        prop_assert!(split.asymmetrical.is_empty());
        prop_assert_eq!(split.symmetrical.len(), ids.len());
        prop_assert!(split.symmetrical.iter().all(|dimm| *dimm == RegionGoalDimm::new(dimm.dimm)));
    }
}
