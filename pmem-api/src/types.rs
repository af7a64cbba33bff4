//! Identity types, size units and platform ceilings

use core::fmt;

use static_assertions::const_assert;

/// One kibibyte
pub const KIB: u64 = 1 << 10;
/// One mebibyte
pub const MIB: u64 = 1 << 20;
/// One gibibyte
pub const GIB: u64 = 1 << 30;

/// Maximum sockets on a platform
pub const MAX_SOCKETS: usize = 16;
/// Maximum modules on one socket
pub const MAX_DIMMS_PER_SOCKET: usize = 16;
/// Maximum modules on a platform
pub const MAX_DIMMS: usize = 128;
/// Maximum interleave sets a single module takes part in
pub const MAX_IS_PER_DIMM: usize = 2;
/// Maximum interleave sets on one socket
pub const MAX_IS_PER_SOCKET: usize = 32;
/// Maximum interleave configurations on a platform
pub const MAX_IS_CONFIGS: usize = 256;

const_assert!(MAX_DIMMS <= MAX_SOCKETS * MAX_DIMMS_PER_SOCKET);
const_assert!(MAX_IS_PER_SOCKET >= MAX_IS_PER_DIMM * MAX_DIMMS_PER_SOCKET);
const_assert!(MAX_IS_CONFIGS >= MAX_IS_PER_SOCKET * MAX_SOCKETS / 2);

/// Module handle as assigned by the inventory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DimmId(pub u32);

impl fmt::Display for DimmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

/// Socket (die) number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SocketId(pub u16);

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Manufacturer-assigned unique identity of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DimmUid {
    /// JEDEC vendor id
    pub vendor_id: u16,
    /// Serial number
    pub serial_number: u32,
    /// Manufacturing location
    pub manufacturing_location: u8,
    /// Manufacturing date (BCD year/week)
    pub manufacturing_date: u16,
}

impl DimmUid {
    /// Whether the identity carries the fields a config record needs
    pub const fn is_complete(&self) -> bool {
        self.vendor_id != 0 && self.serial_number != 0
    }
}

/// Rounds `value` up to a multiple of `align`; zero alignment is identity
pub const fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

/// Rounds `value` down to a multiple of `align`; zero alignment is identity
pub const fn round_down(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value - value % align
}

/// Whether `value` is a multiple of `align`
pub const fn is_aligned(value: u64, align: u64) -> bool {
    align == 0 || value % align == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounding() {
        assert_eq!(round_up(GIB + 1, GIB), 2 * GIB);
        assert_eq!(round_up(2 * GIB, GIB), 2 * GIB);
        assert_eq!(round_down(2 * GIB - 1, GIB), GIB);
        assert_eq!(round_down(5, 0), 5);
        assert!(is_aligned(32 * GIB, 32 * GIB));
        assert!(!is_aligned(33 * GIB, 32 * GIB));
    }
}
