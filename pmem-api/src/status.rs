//! Command status taxonomy
//!
//! Every management request carries a [`CommandStatus`]: one terminal code
//! for the command plus any number of per-object codes. Warnings travel
//! alongside a successful result and are surfaced to the user verbatim.

use alloc::vec::Vec;
use core::fmt;

use crate::types::{DimmId, SocketId};

/// Numeric status codes reported back to management tooling
///
/// Variant names follow the management tool's status table; the `Warn`
/// prefix marks advisories.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
#[derive(Default)]
pub enum NvmStatusCode {
    #[default]
    Success = 0,
    OperationFailed = 3,
    InvalidParameter = 5,
    DimmNotFound = 11,
    ConfigNotSupportedByCurrentSku = 16,
    ManageableDimmNotFound = 17,
    WarnRegionMaxPmInterleaveSetsExceeded = 98,
    WarnMaxAdPmIsExceeded = 99,
    WarnMaxAdNiPmIsExceeded = 100,
    WarnAdNiPmIsReduced = 101,
    ErrRegionMaxPmInterleaveSetsExceeded = 102,
    Warn2lmModeOff = 103,
    WarnImcDdrPmmNotPaired = 104,
    PcdBadDeviceConfig = 105,
    RegionGoalConfAffectsUnspecDimm = 106,
    RegionCurrConfAffectsUnspecDimm = 107,
    RegionGoalCurrConfAffectsUnspecDimm = 108,
    RegionConfApplyingFailed = 109,
    RegionConfUnsupportedConfig = 110,
    RegionNotFound = 111,
    PlatformNotSupportManagementSoft = 112,
    PlatformNotSupport2lmMode = 113,
    PlatformNotSupportPmMode = 114,
    RegionCurrConfExists = 115,
    RegionSizeTooSmallForIntSetAlignment = 116,
    PlatformNotSupportSpecifiedIntSizes = 117,
    PlatformNotSupportDefaultIntSizes = 118,
    RegionNotHealthy = 119,
    RegionNoGoalExistsOnDimm = 122,
    ReserveDimmRequiresAtLeastTwoDimms = 123,
    PersMemMustBeAppliedToAllDimms = 126,
    WarnMappedMemReducedDueToCpuSku = 127,
    GetPcdFailed = 260,
    AppdirectInSystem = 262,
    DeviceError = 310,
    MixedGenerationsNotSupported = 315,
    WarnNmFmRatioLowerViolation = 316,
    WarnNmFmRatioUpperViolation = 317,
    ErrNmFmRatioGreaterThanOne = 318,
    WarnPmttTableMissing = 319,
}

impl NvmStatusCode {
    /// Numeric value of the code
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Whether the code is advisory only
    pub const fn is_warning(self) -> bool {
        matches!(
            self,
            NvmStatusCode::WarnRegionMaxPmInterleaveSetsExceeded
                | NvmStatusCode::WarnMaxAdPmIsExceeded
                | NvmStatusCode::WarnMaxAdNiPmIsExceeded
                | NvmStatusCode::WarnAdNiPmIsReduced
                | NvmStatusCode::Warn2lmModeOff
                | NvmStatusCode::WarnImcDdrPmmNotPaired
                | NvmStatusCode::WarnMappedMemReducedDueToCpuSku
                | NvmStatusCode::WarnNmFmRatioLowerViolation
                | NvmStatusCode::WarnNmFmRatioUpperViolation
                | NvmStatusCode::WarnPmttTableMissing
        )
    }

    /// Whether the code reports a failure
    pub const fn is_error(self) -> bool {
        !matches!(self, NvmStatusCode::Success) && !self.is_warning()
    }
}

impl fmt::Display for NvmStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Object a status entry is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectId {
    /// A single module
    Dimm(DimmId),
    /// A whole socket
    Socket(SocketId),
}

/// A status code attached to one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectStatus {
    /// Object the code refers to
    pub object: ObjectId,
    /// Reported code
    pub code: NvmStatusCode,
}

/// Aggregate status of one management command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CommandStatus {
    /// Terminal status of the command
    pub general: NvmStatusCode,
    /// Per-object entries in the order they were recorded
    pub objects: Vec<ObjectStatus>,
}

impl CommandStatus {
    /// Creates an empty, successful status
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the terminal code
    pub fn set(&mut self, code: NvmStatusCode) {
        self.general = code;
    }

    /// Records a code against one object; repeated codes are not duplicated
    pub fn set_object_status(&mut self, object: ObjectId, code: NvmStatusCode) {
        let entry = ObjectStatus { object, code };
        if !self.objects.contains(&entry) {
            self.objects.push(entry);
        }
    }

    /// Records a code against an object and makes it the terminal code
    pub fn set_object_status_and_general(&mut self, object: ObjectId, code: NvmStatusCode) {
        self.set_object_status(object, code);
        self.set(code);
    }

    /// Whether any code has been attached to the object
    pub fn has_object_status(&self, object: ObjectId) -> bool {
        self.objects.iter().any(|entry| entry.object == object)
    }

    /// Codes attached to one object
    pub fn object_codes(&self, object: ObjectId) -> impl Iterator<Item = NvmStatusCode> + '_ {
        self.objects
            .iter()
            .filter(move |entry| entry.object == object)
            .map(|entry| entry.code)
    }

    /// Advisory entries
    pub fn warnings(&self) -> impl Iterator<Item = &ObjectStatus> {
        self.objects.iter().filter(|entry| entry.code.is_warning())
    }

    /// Whether the code was recorded anywhere in the status
    pub fn contains(&self, code: NvmStatusCode) -> bool {
        self.general == code || self.objects.iter().any(|entry| entry.code == code)
    }

    /// Whether the terminal code or any object code is a failure
    pub fn has_errors(&self) -> bool {
        self.general.is_error() || self.objects.iter().any(|entry| entry.code.is_error())
    }

    /// Clears every entry and resets the terminal code to success
    pub fn reset(&mut self) {
        self.general = NvmStatusCode::Success;
        self.objects.clear();
    }
}
