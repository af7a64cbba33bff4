//! Platform Config Data model
//!
//! Decoded form of the configuration tables kept in each module's PCD
//! partition: the current config written by firmware, the config input
//! written by management software and the config output firmware leaves
//! after processing an input. Byte layout belongs to the collaborators
//! behind [`PlatformConfigSource`] and [`ConfigSender`].
//!
//! [`ConfigInputBuilder`] turns committed goals into a [`ConfigInput`].

use alloc::vec::Vec;

use pmem_api::{DimmId, DimmUid, Result, aborted};

use crate::dimm::{Dimm, DimmInventory};
use crate::goal::{GoalArena, InterleaveSetType};
use crate::platform::{ChannelWays, InterleaveSize};

/// Status of the current config as reported by firmware
///
/// Variants mirror the firmware status values.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DimmConfigStatus {
    #[default]
    Undefined = 0,
    Success = 1,
    Reserved = 2,
    IsIncomplete = 3,
    NoMatchingIs = 4,
    NewDimm = 5,
    OldConfigUsed = 6,
    BadConfig = 7,
    InChecksumNotValid = 8,
    RevisionNotSupported = 9,
    CurrChecksumNotValid = 10,
}

/// Overall validation result in a config output
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ConfigOutputStatus {
    #[default]
    Unknown = 0,
    Success = 1,
    Error = 2,
    NmFmRatioUnsupported = 6,
    CpuMaxMemoryLimitViolation = 7,
    PopulationIssue = 8,
}

/// Per-table result of a partition size change request
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PartitionSizeChangeStatus {
    #[default]
    Undefined = 0,
    Success = 1,
    Reserved = 2,
    DimmMissing = 3,
    IsetMissing = 4,
    ExceedSize = 5,
    FwError = 6,
    ExceedDramDecoders = 7,
    UnsupportedAlignment = 8,
}

/// Per-table result of an interleave set request
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum InterleaveChangeStatus {
    #[default]
    Undefined = 0,
    Success = 1,
    NotProcessed = 2,
    DimmMissing = 3,
    IsetMissing = 4,
    ExceedDramDecoders = 5,
    ExceedMaxSpaSpace = 6,
    MirrorFailed = 7,
    PartitioningFailed = 8,
    CinMissing = 9,
    ChannelNotMatch = 10,
    UnsupportedAlignment = 11,
    RequestUnsupported = 12,
}

/// Identification layout used in interleave information tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcdRevision {
    /// Modules identified by vendor and serial number
    V1,
    /// Modules identified by the full unique id
    #[default]
    V2,
}

/// How a member module is identified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimmIdentifier {
    /// Vendor id plus serial number
    Serial {
        /// JEDEC vendor id
        vendor_id: u16,
        /// Module serial number
        serial_number: u32,
    },
    /// Full unique id
    Uid(DimmUid),
}

impl DimmIdentifier {
    /// Identifier of `dimm` in the given layout
    pub fn for_dimm(dimm: &Dimm, revision: PcdRevision) -> Self {
        match revision {
            PcdRevision::V1 => DimmIdentifier::Serial {
                vendor_id: dimm.uid.vendor_id,
                serial_number: dimm.uid.serial_number,
            },
            PcdRevision::V2 => DimmIdentifier::Uid(dimm.uid),
        }
    }

    /// Whether the identifier carries a vendor and a serial number
    pub fn is_complete(&self) -> bool {
        match self {
            DimmIdentifier::Serial { vendor_id, serial_number } => *vendor_id != 0 && *serial_number != 0,
            DimmIdentifier::Uid(uid) => uid.vendor_id != 0 && uid.serial_number != 0,
        }
    }

    /// Looks the module up in the inventory
    pub fn resolve<'a>(&self, inventory: &'a DimmInventory) -> Option<&'a Dimm> {
        match self {
            DimmIdentifier::Serial { vendor_id, serial_number } => inventory.find_by_serial(*vendor_id, *serial_number),
            DimmIdentifier::Uid(uid) => inventory.find_by_uid(uid),
        }
    }
}

/// One member of an interleave information table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentificationInfo {
    /// Member module
    pub dimm: DimmIdentifier,
    /// Offset inside the persistent partition
    pub partition_offset: u64,
    /// Size of the member's region
    pub partition_size: u64,
}

/// Requested or current persistent partition size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionSizeChange {
    /// Persistent partition size in bytes
    pub pm_partition_size: u64,
    /// Result reported by firmware
    pub status: PartitionSizeChangeStatus,
}

/// One interleave set as seen by a member module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleaveInformation {
    /// System-wide interleave set index
    pub interleave_set_index: u16,
    /// Number of member modules
    pub num_dimms: u8,
    /// Interleave width
    pub channel_ways: ChannelWays,
    /// iMC interleave granularity
    pub imc_interleaving: InterleaveSize,
    /// Channel interleave granularity
    pub channel_interleaving: InterleaveSize,
    /// Set is mirrored
    pub mirror: bool,
    /// Result reported by firmware
    pub status: InterleaveChangeStatus,
    /// Member modules in set order
    pub identifications: Vec<IdentificationInfo>,
}

/// Tables a config body may carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PcatTable {
    /// Persistent partition size
    PartitionSizeChange(PartitionSizeChange),
    /// Interleave set membership
    InterleaveInformation(InterleaveInformation),
    /// Vendor extension, ignored by the engine
    ConfigManagementAttributes,
    /// Table type the engine does not know
    Unknown(u8),
}

/// Configuration firmware applied at the last boot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentConfig {
    /// Outcome of applying the last config input
    pub status: DimmConfigStatus,
    /// Volatile bytes mapped
    pub volatile_memory_size: u64,
    /// Persistent bytes mapped
    pub persistent_memory_size: u64,
    /// Tables describing the current layout
    pub tables: Vec<PcatTable>,
}

/// Configuration requested by management software
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigInput {
    /// Sequence number firmware echoes in its output
    pub sequence_number: u32,
    /// Requested tables
    pub tables: Vec<PcatTable>,
}

/// Firmware's answer to a config input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOutput {
    /// Sequence number of the input this output answers
    pub sequence_number: u32,
    /// Overall result
    pub validation_status: ConfigOutputStatus,
    /// Per-table results
    pub tables: Vec<PcatTable>,
}

/// Decoded PCD partition of one module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformConfigData {
    /// Current config body
    pub current: Option<CurrentConfig>,
    /// Pending config input body
    pub input: Option<ConfigInput>,
    /// Config output body
    pub output: Option<ConfigOutput>,
}

/// Reads a module's decoded PCD
pub trait PlatformConfigSource {
    /// `Ok(None)` when the module has no PCD
    fn platform_config(&self, dimm: DimmId) -> Result<Option<PlatformConfigData>>;
}

/// Writes config inputs back to modules
pub trait ConfigSender {
    /// Sequence number the next config input must carry
    fn next_sequence_number(&self, dimm: DimmId) -> Result<u32>;
    /// Drops the config input from the module's PCD
    fn clear_config_input(&mut self, dimm: DimmId) -> Result<()>;
    /// Replaces the config input in the module's PCD
    fn send_config_input(&mut self, dimm: DimmId, input: &ConfigInput) -> Result<()>;
}

/// Builds config inputs from committed goals
pub struct ConfigInputBuilder<'a> {
    inventory: &'a DimmInventory,
    arena: &'a GoalArena,
    revision: PcdRevision,
}

impl<'a> ConfigInputBuilder<'a> {
    /// Builder using the default PCD revision
    pub fn new(inventory: &'a DimmInventory, arena: &'a GoalArena) -> Self {
        Self { inventory, arena, revision: PcdRevision::default() }
    }

    /// Identification layout to write
    pub fn with_revision(mut self, revision: PcdRevision) -> Self {
        self.revision = revision;
        self
    }

    /// Config input describing `dimm`'s volatile goal and region goals
    ///
    /// Members of each set are listed in the order firmware expects:
    /// by channel then iMC, or by channel parity first for six-way sets.
    pub fn build(&self, dimm: DimmId, sequence_number: u32) -> Result<ConfigInput> {
        let owner = self.inventory.require(dimm)?;
        let mut tables = Vec::with_capacity(owner.goal_count() + 1);
        tables.push(PcatTable::PartitionSizeChange(PartitionSizeChange {
            pm_partition_size: owner.raw_capacity.saturating_sub(owner.goal.volatile_size_goal),
            status: PartitionSizeChangeStatus::Undefined,
        }));

        let mut offset = 0u64;
        for handle in owner.goal_handles() {
            let goal = self
                .arena
                .get(handle)
                .ok_or_else(|| aborted("module references a freed goal"))?;
            let partition_size = goal.size_per_dimm();

            let mut members = Vec::with_capacity(goal.dimms.len());
            for id in &goal.dimms {
                members.push(self.inventory.require(*id)?);
            }
            if members.len() == 6 {
                members.sort_by_key(|member| {
                    let location = member.location;
                    ((location.channel + location.imc) % 2, location.channel)
                });
            } else {
                members.sort_by_key(|member| (member.location.channel, member.location.imc));
            }

            let identifications = members
                .iter()
                .map(|member| IdentificationInfo {
                    dimm: DimmIdentifier::for_dimm(member, self.revision),
                    partition_offset: offset,
                    partition_size,
                })
                .collect();
            tables.push(PcatTable::InterleaveInformation(InterleaveInformation {
                interleave_set_index: goal.interleave_set_index,
                num_dimms: goal.dimms.len() as u8,
                channel_ways: goal.channel_ways,
                imc_interleaving: goal.imc_interleaving,
                channel_interleaving: goal.channel_interleaving,
                mirror: goal.set_type == InterleaveSetType::Mirrored,
                status: InterleaveChangeStatus::Undefined,
                identifications,
            }));
            offset += partition_size;
        }

        Ok(ConfigInput { sequence_number, tables })
    }
}
