//! Platform capability data
//!
//! Decoded PCAT, PMTT and socket SKU information as supplied by firmware
//! table collaborators. Nothing here is parsed from bytes; the engine only
//! consumes the already-decoded shapes.

use alloc::vec;
use alloc::vec::Vec;

use pmem_api::{Error, Result, SocketId, load_error};

use crate::topology::Topology;

bitflags::bitflags! {
    /// Interleave widths, one bit per supported number of ways
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ChannelWays: u16 {
        const WAYS_1 = 1 << 0;
        const WAYS_2 = 1 << 1;
        const WAYS_3 = 1 << 2;
        const WAYS_4 = 1 << 3;
        const WAYS_6 = 1 << 4;
        const WAYS_8 = 1 << 5;
        const WAYS_12 = 1 << 6;
        const WAYS_16 = 1 << 7;
        const WAYS_24 = 1 << 8;
    }
}

const WAYS_BY_COUNT: [(usize, ChannelWays); 9] = [
    (1, ChannelWays::WAYS_1),
    (2, ChannelWays::WAYS_2),
    (3, ChannelWays::WAYS_3),
    (4, ChannelWays::WAYS_4),
    (6, ChannelWays::WAYS_6),
    (8, ChannelWays::WAYS_8),
    (12, ChannelWays::WAYS_12),
    (16, ChannelWays::WAYS_16),
    (24, ChannelWays::WAYS_24),
];

impl ChannelWays {
    /// Ways bit for a module count, empty when the count is not a supported width
    pub fn from_dimm_count(count: usize) -> Self {
        WAYS_BY_COUNT
            .iter()
            .find(|(ways, _)| *ways == count)
            .map(|(_, bit)| *bit)
            .unwrap_or_else(ChannelWays::empty)
    }

    /// Module count of a single ways bit
    pub fn dimm_count(self) -> Option<usize> {
        WAYS_BY_COUNT
            .iter()
            .find(|(_, bit)| *bit == self)
            .map(|(ways, _)| *ways)
    }
}

bitflags::bitflags! {
    /// iMC or channel interleave granularity; empty means platform default
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InterleaveSize: u8 {
        const SIZE_64B = 1 << 0;
        const SIZE_128B = 1 << 1;
        const SIZE_256B = 1 << 2;
        const SIZE_4KB = 1 << 6;
        const SIZE_1GB = 1 << 7;
    }
}

impl InterleaveSize {
    /// Platform-default granularity marker
    pub const DEFAULT: Self = Self::empty();

    /// Whether the size defers to the platform recommendation
    pub fn is_default(self) -> bool {
        self.is_empty()
    }
}

bitflags::bitflags! {
    /// Memory modes enabled by platform firmware
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MemoryModes: u8 {
        /// Two-level memory, modules as volatile far memory
        const MEMORY = 0b0000_0001;
        /// Persistent memory exposed directly
        const APP_DIRECT = 0b0000_0010;
    }
}

/// Memory mode an interleave capability entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PcatMemoryMode {
    /// One-level memory
    OneLm = 0,
    /// Two-level memory, DDR caching persistent modules
    TwoLm = 1,
    /// Persistent memory direct access
    PmDirect = 3,
    /// Persistent memory cached by DDR
    PmCached = 4,
}

/// One supported (ways, iMC size, channel size) tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterleaveFormat {
    /// Widths this tuple applies to
    pub ways: ChannelWays,
    /// iMC interleave granularity
    pub imc: InterleaveSize,
    /// Channel interleave granularity
    pub channel: InterleaveSize,
    /// Platform recommended tuple
    pub recommended: bool,
}

/// Memory interleave capability entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveCapability {
    /// Memory mode
    pub mode: PcatMemoryMode,
    /// Interleave alignment as a power of two
    pub alignment_exponent: u8,
    /// Supported formats
    pub formats: Vec<InterleaveFormat>,
}

impl InterleaveCapability {
    /// Interleave alignment in bytes
    pub fn alignment(&self) -> Result<u64> {
        1u64.checked_shl(u32::from(self.alignment_exponent))
            .ok_or_else(|| Error::DeviceError("interleave alignment exponent out of range".into()))
    }

    /// First recommended format
    pub fn recommended(&self) -> Option<&InterleaveFormat> {
        self.formats.iter().find(|format| format.recommended)
    }
}

/// Platform capability information entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilityInfo {
    /// Management software may write config input
    pub mgmt_sw_config_input: bool,
    /// Modes enabled by firmware
    pub memory_modes: MemoryModes,
}

/// Per-socket SKU limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSku {
    /// Socket the limits apply to
    pub socket: SocketId,
    /// Ceiling of memory the CPU SKU can map
    pub mapped_memory_limit: u64,
    /// Memory currently mapped into the system address space
    pub total_memory_mapped_to_spa: u64,
    /// DDR currently acting as near-memory cache
    pub caching_memory_size: u64,
}

/// DDR population of one socket from the PMTT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketDdr {
    /// Socket the DDR is populated on
    pub socket: SocketId,
    /// DDR capacity in bytes
    pub capacity: u64,
}

/// Limits on persistent interleave sets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxPmInterleaveSets {
    /// Per socket (die)
    pub per_die: u8,
    /// Per module
    pub per_dcpmm: u8,
}

/// Everything the engine knows about the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Platform capability information; `None` when the PCAT is absent
    pub platform: Option<PlatformCapabilityInfo>,
    /// Memory interleave capability entries
    pub interleave: Vec<InterleaveCapability>,
    /// Socket SKU entries; empty when the platform reports none
    pub socket_skus: Vec<SocketSku>,
    /// DDR per socket; `None` when the PMTT is absent
    pub pmtt: Option<Vec<SocketDdr>>,
    /// Interleave set count limits
    pub max_pm_interleave_sets: Option<MaxPmInterleaveSets>,
    /// BIOS allows two-level memory with the installed DDR
    pub memory_mode_allowed_by_bios: bool,
    /// Socket topology and interleave maps
    pub topology: Topology,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        let ways = ChannelWays::WAYS_1
            | ChannelWays::WAYS_2
            | ChannelWays::WAYS_3
            | ChannelWays::WAYS_4
            | ChannelWays::WAYS_6;
        Self {
            platform: Some(PlatformCapabilityInfo {
                mgmt_sw_config_input: true,
                memory_modes: MemoryModes::MEMORY | MemoryModes::APP_DIRECT,
            }),
            interleave: vec![InterleaveCapability {
                mode: PcatMemoryMode::PmDirect,
                alignment_exponent: 30,
                formats: vec![
                    InterleaveFormat {
                        ways,
                        imc: InterleaveSize::SIZE_4KB,
                        channel: InterleaveSize::SIZE_4KB,
                        recommended: true,
                    },
                    InterleaveFormat {
                        ways,
                        imc: InterleaveSize::SIZE_4KB,
                        channel: InterleaveSize::SIZE_256B,
                        recommended: false,
                    },
                ],
            }],
            socket_skus: Vec::new(),
            pmtt: None,
            max_pm_interleave_sets: None,
            memory_mode_allowed_by_bios: true,
            topology: Topology::default(),
        }
    }
}

impl PlatformCapabilities {
    /// Platform capability entry, or `LoadError` when the PCAT is absent
    pub fn platform_info(&self) -> Result<&PlatformCapabilityInfo> {
        self.platform
            .as_ref()
            .ok_or_else(|| load_error("platform capability table not found"))
    }

    /// Interleave capability for persistent direct mode
    pub fn pm_direct_capability(&self) -> Result<&InterleaveCapability> {
        self.interleave
            .iter()
            .find(|cap| cap.mode == PcatMemoryMode::PmDirect)
            .ok_or_else(|| load_error("PM direct interleave capability not found"))
    }

    /// SKU entry of a socket
    pub fn socket_sku(&self, socket: SocketId) -> Option<&SocketSku> {
        self.socket_skus.iter().find(|sku| sku.socket == socket)
    }

    /// DDR capacity of a socket from the PMTT; `None` when the table is absent
    pub fn ddr_capacity(&self, socket: SocketId) -> Option<u64> {
        self.pmtt.as_ref().map(|entries| {
            entries
                .iter()
                .filter(|entry| entry.socket == socket)
                .map(|entry| entry.capacity)
                .sum()
        })
    }

    /// Whether firmware enables a memory mode
    pub fn supports_mode(&self, mode: MemoryModes) -> bool {
        self.platform
            .map(|info| info.memory_modes.contains(mode))
            .unwrap_or(false)
    }
}
