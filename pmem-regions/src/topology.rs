//! Socket topology and the interleave matcher
//!
//! A socket is a grid of iMCs by channels. Each candidate interleave is a
//! bitmap over that grid, and a candidate only matches when every set bit
//! is populated by a module from the pool.

use alloc::vec::Vec;

use crate::dimm::Dimm;

/// Bitmaps for a 2 iMC x 3 channel socket, widest and preferred first
pub const DEFAULT_INTERLEAVE_MAPS: [u32; 21] = [
    // x6
    0x3F,
    // x4
    0x1B, 0x2D, 0x36,
    // x3
    0x07, 0x38,
    // x2 across iMCs
    0x09, 0x12, 0x24,
    // x2 within an iMC
    0x03, 0x05, 0x06, 0x18, 0x28, 0x30,
    // x1
    0x01, 0x02, 0x04, 0x08, 0x10, 0x20,
];

/// Socket layout plus the ordered list of candidate interleave bitmaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Memory controllers per socket
    pub imcs_per_socket: u8,
    /// Channels per memory controller
    pub channels_per_imc: u8,
    /// Candidate bitmaps in priority order
    pub interleave_maps: Vec<u32>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new(2, 3)
    }
}

impl Topology {
    /// Topology with the built-in priority list for its slot count
    pub fn new(imcs_per_socket: u8, channels_per_imc: u8) -> Self {
        let mut topology = Self {
            imcs_per_socket,
            channels_per_imc,
            interleave_maps: Vec::new(),
        };
        if imcs_per_socket == 2 && channels_per_imc == 3 {
            topology.interleave_maps.extend_from_slice(&DEFAULT_INTERLEAVE_MAPS);
        } else {
            let slots = topology.slot_count();
            if slots > 1 {
                topology.interleave_maps.push(full_mask(slots));
            }
            topology.interleave_maps.extend(singles(slots));
        }
        topology
    }

    /// Use the platform's own priority list; single-slot maps are appended
    /// so a lone module can always be placed
    pub fn with_platform_maps(mut self, maps: &[u32]) -> Self {
        self.interleave_maps = maps.to_vec();
        self.interleave_maps.extend(singles(self.slot_count()));
        self
    }

    /// Number of (iMC, channel) slots on a socket
    pub fn slot_count(&self) -> u32 {
        u32::from(self.imcs_per_socket) * u32::from(self.channels_per_imc)
    }

    /// Slot index of an (iMC, channel) position
    pub fn slot_of(&self, imc: u8, channel: u8) -> u32 {
        let channels = self.channels_per_imc.max(1);
        u32::from(self.imcs_per_socket) * u32::from(channel % channels) + u32::from(imc)
    }

    /// Pool positions covering `bitmap` exactly, one module per set bit
    ///
    /// The first module found for a slot wins. Returns `None` unless every
    /// set bit is covered.
    pub fn match_bitmap(&self, pool: &[&Dimm], bitmap: u32) -> Option<Vec<usize>> {
        let mut not_found = bitmap;
        let mut picked = Vec::new();
        for (position, dimm) in pool.iter().enumerate() {
            let slot = self.slot_of(dimm.location.imc, dimm.location.channel);
            if slot >= u32::BITS {
                continue;
            }
            let bit = 1u32 << slot;
            if not_found & bit != 0 {
                not_found &= !bit;
                picked.push(position);
            }
        }
        if not_found == 0 && !picked.is_empty() {
            Some(picked)
        } else {
            None
        }
    }

    /// First bitmap in priority order that the pool fully satisfies
    pub fn find_best(&self, pool: &[&Dimm]) -> Option<Vec<usize>> {
        self.interleave_maps
            .iter()
            .find_map(|bitmap| self.match_bitmap(pool, *bitmap))
    }
}

fn full_mask(slots: u32) -> u32 {
    if slots >= u32::BITS {
        u32::MAX
    } else {
        (1u32 << slots) - 1
    }
}

fn singles(slots: u32) -> impl Iterator<Item = u32> {
    (0..slots.min(u32::BITS)).map(|slot| 1u32 << slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use crate::dimm::{Dimm, DimmLocation};
    use pmem_api::{DimmId, DimmUid, SocketId, GIB};

    fn dimm(id: u32, imc: u8, channel: u8) -> Dimm {
        Dimm::new(
            DimmId(id),
            DimmUid { vendor_id: 0x8089, serial_number: id, ..Default::default() },
            DimmLocation { socket: SocketId(0), imc, channel, channel_position: 0 },
            128 * GIB,
        )
    }

    #[test]
    fn test_slot_formula() {
        let topology = Topology::default();
        assert_eq!(topology.slot_of(0, 0), 0);
        assert_eq!(topology.slot_of(1, 0), 1);
        assert_eq!(topology.slot_of(1, 1), 3);
        assert_eq!(topology.slot_of(0, 2), 4);
    }

    #[test]
    fn test_four_way_match() {
        let topology = Topology::default();
        let dimms = [dimm(1, 0, 0), dimm(2, 1, 0), dimm(3, 1, 1), dimm(4, 0, 2)];
        let pool: Vec<&Dimm> = dimms.iter().collect();
        let picked = topology.find_best(&pool).unwrap();
        assert_eq!(picked, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_partial_bitmap_rejected() {
        let topology = Topology::default();
        let dimms = [dimm(1, 0, 0), dimm(2, 1, 0)];
        let pool: Vec<&Dimm> = dimms.iter().collect();
        assert!(topology.match_bitmap(&pool, 0x1B).is_none());
        assert_eq!(topology.match_bitmap(&pool, 0x03), Some(vec![0, 1]));
    }

    #[test]
    fn test_one_module_per_slot() {
        let topology = Topology::default();
        let mut second = dimm(2, 0, 0);
        second.location.channel_position = 1;
        let dimms = [dimm(1, 0, 0), second];
        let pool: Vec<&Dimm> = dimms.iter().collect();
        assert_eq!(topology.find_best(&pool), Some(vec![0]));
    }

    #[test]
    fn test_platform_maps_get_singles() {
        let topology = Topology::default().with_platform_maps(&[0x3F, 0x09]);
        assert_eq!(topology.interleave_maps.len(), 2 + 6);
        assert_eq!(*topology.interleave_maps.last().unwrap(), 0x20);
    }
}
