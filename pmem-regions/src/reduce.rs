//! Capacity reducers
//!
//! Each reducer removes `excess` bytes from a list of per-module splits in
//! place and compacts away modules left with nothing. When every reducible
//! byte is gone but excess remains the reducer returns
//! [`Error::CapacityExhausted`] with the leftover; callers that chain
//! reducers treat that as "carry the rest to the next one".

use alloc::vec::Vec;

use pmem_api::{
    CommandStatus, DimmId, Error, NvmStatusCode, ObjectId, Result, SocketId, pmem_debug, pmem_info,
    round_down, round_up,
};

use crate::config::Alignments;
use crate::dimm::DimmInventory;
use crate::goal::RegionGoalDimm;
use crate::platform::PlatformCapabilities;
use crate::template::CapacitySplit;

/// Maps an exhausted reducer to success so the leftover flows onward
pub fn tolerate_exhausted(result: Result<()>) -> Result<()> {
    match result {
        Err(Error::CapacityExhausted(_)) => Ok(()),
        other => other,
    }
}

fn settle(excess: u64, remaining: u64) -> Result<()> {
    if excess == 0 {
        Ok(())
    } else if remaining > 0 {
        pmem_debug!("Unable to correctly map reserved capacity, {} bytes left", excess);
        Err(Error::DeviceError("reducer stopped with capacity and excess left".into()))
    } else {
        Err(Error::CapacityExhausted(excess))
    }
}

/// Takes AppDirect capacity evenly from every module
///
/// Each round removes `excess / modules` rounded up to the persistent
/// alignment from every module that still carries AppDirect capacity.
/// Modules that cannot give a full share are drained. Modules left with no
/// capacity of either kind are dropped from the list.
pub fn reduce_app_direct(excess: &mut u64, dimms: &mut Vec<RegionGoalDimm>, alignment: u64) -> Result<()> {
    if *excess == 0 {
        return Ok(());
    }

    let total: u64 = dimms.iter().map(|dimm| dimm.region_size).sum();
    if total <= *excess {
        *excess -= total;
        let keep_list = dimms.iter().any(|dimm| dimm.volatile_size > 0);
        for dimm in dimms.iter_mut() {
            dimm.region_size = 0;
        }
        if !keep_list {
            dimms.clear();
        }
        return settle(*excess, 0);
    }

    let rounds = dimms.len();
    let mut remaining = total;
    for _ in 0..rounds {
        let carrying = dimms.iter().filter(|dimm| dimm.region_size > 0).count() as u64;
        if carrying == 0 {
            break;
        }
        let reduce_by = round_up(excess.div_ceil(carrying), alignment);
        for dimm in dimms.iter_mut() {
            if dimm.region_size >= reduce_by && *excess >= reduce_by {
                dimm.region_size -= reduce_by;
                *excess -= reduce_by;
            } else if dimm.region_size >= reduce_by {
                // over-reduce to stay aligned
                dimm.region_size -= reduce_by;
                *excess = 0;
            } else {
                *excess = excess.saturating_sub(dimm.region_size);
                dimm.region_size = 0;
            }
        }
        dimms.retain(|dimm| dimm.region_size != 0 || dimm.volatile_size != 0);

        remaining = dimms.iter().map(|dimm| dimm.region_size).sum();
        if remaining == 0 || *excess == 0 || dimms.is_empty() {
            break;
        }
    }
    settle(*excess, remaining)
}

/// Takes volatile capacity from the largest modules first
///
/// Every round lowers the modules holding the largest volatile size toward
/// the next largest value, keeping the remaining split as even as possible.
/// Splits must carry no AppDirect capacity.
pub fn reduce_volatile(excess: &mut u64, dimms: &mut Vec<RegionGoalDimm>, alignment: u64) -> Result<()> {
    if *excess == 0 {
        return Ok(());
    }
    if dimms.iter().any(|dimm| dimm.region_size > 0) {
        pmem_debug!("Cannot reduce volatile capacity while region capacity exists");
        return Err(Error::Aborted("volatile reduction with AppDirect capacity present".into()));
    }

    let total: u64 = dimms.iter().map(|dimm| dimm.volatile_size).sum();
    if total <= *excess {
        *excess -= total;
        dimms.clear();
        return settle(*excess, 0);
    }

    let rounds = dimms.len() + 1;
    let mut remaining = total;
    for _ in 0..rounds {
        let largest = dimms.iter().map(|dimm| dimm.volatile_size).max().unwrap_or(0);
        if largest == 0 {
            break;
        }
        let second = dimms
            .iter()
            .map(|dimm| dimm.volatile_size)
            .filter(|size| *size != largest)
            .max()
            .unwrap_or(0);
        let holders = dimms.iter().filter(|dimm| dimm.volatile_size == largest).count() as u64;
        let reduce_by = round_up(excess.div_ceil(holders), alignment).min(largest - second);

        for dimm in dimms.iter_mut().filter(|dimm| dimm.volatile_size == largest) {
            if dimm.volatile_size >= reduce_by && *excess >= reduce_by {
                dimm.volatile_size -= reduce_by;
                *excess -= reduce_by;
            } else if dimm.volatile_size >= reduce_by {
                dimm.volatile_size -= reduce_by;
                *excess = 0;
            } else {
                *excess = excess.saturating_sub(dimm.volatile_size);
                dimm.volatile_size = 0;
            }
        }

        remaining = dimms.iter().map(|dimm| dimm.volatile_size).sum();
        if remaining == 0 || *excess == 0 {
            break;
        }
    }
    settle(*excess, remaining)
}

/// Modules and socket a SKU check applies to
#[derive(Debug, Clone, Copy)]
pub struct SocketRequest<'a> {
    /// Socket being planned
    pub socket: SocketId,
    /// Requested manageable modules on the socket
    pub dimms: &'a [DimmId],
}

/// Shrinks a socket's split until it fits the CPU SKU mapping ceiling
///
/// The total to be mapped counts new AppDirect capacity, aligned volatile
/// capacity and whatever the rest of the socket keeps mapped. AppDirect is
/// reduced first (asymmetric, then symmetric), volatile last. Any reduction
/// attaches a socket-level warning. Sockets without a SKU entry are left
/// untouched.
pub fn reduce_for_socket_sku(
    inventory: &DimmInventory,
    platform: &PlatformCapabilities,
    alignments: &Alignments,
    request: &SocketRequest<'_>,
    split: &mut CapacitySplit,
    status: &mut CommandStatus,
) -> Result<()> {
    let socket = request.socket;
    let Some(sku) = platform.socket_sku(socket) else {
        return Ok(());
    };
    let whole_socket = request.dimms.len() == inventory.manageable_on_socket(socket).count();

    let current_memory_mode = inventory
        .manageable_on_socket(socket)
        .any(|dimm| dimm.config.mapped_volatile_capacity > 0);
    let mut new_memory_mode = split.symmetrical.iter().any(|dimm| dimm.volatile_size > 0);
    if !new_memory_mode && !whole_socket {
        // a partial request inherits the memory mode of configured modules
        new_memory_mode = inventory
            .manageable_on_socket(socket)
            .any(|dimm| dimm.config.mapped_volatile_capacity > 0 && dimm.config.configured);
    }

    let mut total: u64 = split
        .symmetrical
        .iter()
        .map(|dimm| dimm.region_size + round_down(dimm.volatile_size, alignments.volatile))
        .sum::<u64>()
        + split.asymmetrical.iter().map(|dimm| dimm.region_size).sum::<u64>();

    let configured_on_socket = || {
        inventory
            .manageable_on_socket(socket)
            .filter(|dimm| dimm.config.configured)
    };
    match (current_memory_mode, new_memory_mode) {
        (false, false) => {
            total += sku.total_memory_mapped_to_spa;
            for id in request.dimms {
                let mapped = inventory.require(*id)?.config.mapped_persistent_capacity;
                if total < mapped {
                    pmem_debug!("Socket {}: mapping negative capacity", socket);
                    status.set(NvmStatusCode::OperationFailed);
                    return Err(Error::Unsupported("mapped persistent capacity exceeds mapped total".into()));
                }
                total -= mapped;
            }
        }
        (true, false) if whole_socket => total += sku.caching_memory_size,
        (true, false) => {
            total += sku.caching_memory_size;
            total += configured_on_socket()
                .map(|dimm| dimm.config.mapped_persistent_capacity)
                .sum::<u64>();
        }
        (_, true) if !whole_socket => {
            total += configured_on_socket()
                .map(|dimm| dimm.config.mapped_persistent_capacity + dimm.config.mapped_volatile_capacity)
                .sum::<u64>();
        }
        _ => {}
    }

    if total <= sku.mapped_memory_limit {
        return Ok(());
    }

    pmem_info!(
        "Socket {}: requested {:#x} exceeds SKU limit {:#x}, reducing",
        socket,
        total,
        sku.mapped_memory_limit
    );
    status.set_object_status(ObjectId::Socket(socket), NvmStatusCode::WarnMappedMemReducedDueToCpuSku);

    let mut excess = total - sku.mapped_memory_limit;
    let reduced = tolerate_exhausted(reduce_app_direct(&mut excess, &mut split.asymmetrical, alignments.persistent))
        .and_then(|_| {
            tolerate_exhausted(reduce_app_direct(&mut excess, &mut split.symmetrical, alignments.persistent))
        })
        .and_then(|_| tolerate_exhausted(reduce_volatile(&mut excess, &mut split.symmetrical, alignments.volatile)));
    if let Err(err) = reduced {
        status.set(NvmStatusCode::OperationFailed);
        return Err(err);
    }

    if split.symmetrical.is_empty() {
        split.symmetrical = request.dimms.iter().map(|id| RegionGoalDimm::new(*id)).collect();
    }
    Ok(())
}
