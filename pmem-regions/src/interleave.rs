//! Interleaving planner
//!
//! Splits the modules of one socket into the widest interleave groups the
//! topology allows and creates one goal per group.

use alloc::vec::Vec;

use pmem_api::{DimmId, Error, Result, pmem_debug};

use crate::dimm::{Dimm, DimmInventory};
use crate::goal::{DriverPreferences, RegionGoal, RegionGoalTemplate, create_goal};
use crate::topology::Topology;

/// Request for one interleaved template on one socket
#[derive(Debug, Clone, Copy)]
pub struct InterleaveRequest<'a> {
    /// Template the goals are built from
    pub template: &'a RegionGoalTemplate,
    /// Modules to spread the goal over, in request order
    pub dimms: &'a [DimmId],
    /// Total size across all modules
    pub size: u64,
    /// Driver granularity; `None` defers to the platform
    pub preferences: Option<&'a DriverPreferences>,
    /// Sequence index every built goal carries
    pub sequence_index: u16,
}

/// Partitions the modules into groups and builds their goals
///
/// Each group gets `size * group / total` bytes; the last group takes
/// whatever integer division left over so the goals always sum to `size`.
/// A zero size creates no goals. Modules that fit no bitmap fail the whole
/// request with `AlignmentError`.
pub fn plan_interleaving(
    topology: &Topology,
    inventory: &DimmInventory,
    request: &InterleaveRequest<'_>,
    next_index: &mut u16,
) -> Result<Vec<RegionGoal>> {
    let mut goals = Vec::new();
    if request.size == 0 {
        return Ok(goals);
    }

    let mut pool: Vec<&Dimm> = request
        .dimms
        .iter()
        .map(|id| inventory.require(*id))
        .collect::<Result<_>>()?;
    let total = pool.len() as u128;
    let mut allocated = 0u64;

    while !pool.is_empty() {
        let Some(picked) = topology.find_best(&pool) else {
            pmem_debug!("Interleaving match not found for {} remaining modules", pool.len());
            return Err(Error::AlignmentError("no interleave bitmap matches remaining modules".into()));
        };
        let group: Vec<DimmId> = picked.iter().map(|position| pool[*position].id).collect();
        for position in picked.iter().rev() {
            pool.remove(*position);
        }

        let goal_size = if pool.is_empty() {
            request.size - allocated
        } else {
            (u128::from(request.size) * group.len() as u128 / total) as u64
        };
        allocated += goal_size;

        goals.push(create_goal(
            request.template,
            group,
            goal_size,
            request.preferences,
            request.sequence_index,
            next_index,
        )?);
    }
    Ok(goals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use crate::dimm::DimmLocation;
    use crate::goal::InterleaveSetType;
    use crate::platform::ChannelWays;
    use pmem_api::{DimmUid, SocketId, GIB};

    fn inventory(slots: &[(u8, u8)]) -> DimmInventory {
        let dimms = slots
            .iter()
            .enumerate()
            .map(|(n, (imc, channel))| {
                Dimm::new(
                    DimmId(n as u32 + 1),
                    DimmUid { vendor_id: 0x8089, serial_number: n as u32 + 1, ..Default::default() },
                    DimmLocation { socket: SocketId(0), imc: *imc, channel: *channel, channel_position: 0 },
                    128 * GIB,
                )
            })
            .collect();
        DimmInventory::new(dimms).unwrap()
    }

    const TEMPLATE: RegionGoalTemplate =
        RegionGoalTemplate { set_type: InterleaveSetType::Interleaved, asymmetrical: false };

    #[test]
    fn test_six_way() {
        let inv = inventory(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2), (1, 2)]);
        let ids = inv.ids();
        let request = InterleaveRequest { template: &TEMPLATE, dimms: &ids, size: 6 * 96 * GIB, preferences: None, sequence_index: 0 };
        let mut next = 1;
        let goals = plan_interleaving(&Topology::default(), &inv, &request, &mut next).unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].channel_ways, ChannelWays::WAYS_6);
        assert_eq!(next, 2);
    }

    #[test]
    fn test_split_with_remainder_to_last_group() {
        // slots 0,1,2,3,4: best is x4 (0x1B) then x1 (slot 2)
        let inv = inventory(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        let ids = inv.ids();
        let size = 5 * 10 * GIB + 3;
        let request = InterleaveRequest { template: &TEMPLATE, dimms: &ids, size, preferences: None, sequence_index: 0 };
        let mut next = 10;
        let goals = plan_interleaving(&Topology::default(), &inv, &request, &mut next).unwrap();
        assert_eq!(goals.len(), 2);
        assert_eq!(goals[0].dimms_num(), 4);
        assert_eq!(goals[0].size, size * 4 / 5);
        assert_eq!(goals[1].dimms, vec![DimmId(3)]);
        assert_eq!(goals[0].size + goals[1].size, size);
        assert_eq!((goals[0].interleave_set_index, goals[1].interleave_set_index), (10, 11));
    }

    #[test]
    fn test_zero_size_creates_nothing() {
        let inv = inventory(&[(0, 0)]);
        let ids = inv.ids();
        let request = InterleaveRequest { template: &TEMPLATE, dimms: &ids, size: 0, preferences: None, sequence_index: 0 };
        let mut next = 1;
        assert!(plan_interleaving(&Topology::default(), &inv, &request, &mut next).unwrap().is_empty());
        assert_eq!(next, 1);
    }

    #[test]
    fn test_unplaceable_module() {
        let inv = inventory(&[(0, 0)]);
        let ids = inv.ids();
        let topology = Topology { interleave_maps: vec![0x3F], ..Topology::default() };
        let request = InterleaveRequest { template: &TEMPLATE, dimms: &ids, size: GIB, preferences: None, sequence_index: 0 };
        let mut next = 1;
        let result = plan_interleaving(&topology, &inv, &request, &mut next);
        assert!(matches!(result, Err(Error::AlignmentError(_))));
    }
}
