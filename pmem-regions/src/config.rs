//! Engine configuration
//!
//! Alignment rules, NM:FM ratio guidance and the label format used for
//! interleave-set cookies. Platform capabilities are inputs, not
//! configuration, and live in [`crate::platform`].

use pmem_api::GIB;

/// Granularity at which AppDirect partitions are carved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AppDirectGranularity {
    /// 1 GiB partition granularity
    Gib1,
    /// 32 GiB partition granularity
    #[default]
    Gib32,
}

impl AppDirectGranularity {
    /// Partition alignment in bytes
    pub const fn partition_alignment(self) -> u64 {
        match self {
            AppDirectGranularity::Gib1 => GIB,
            AppDirectGranularity::Gib32 => 32 * GIB,
        }
    }
}

/// Alignments used by every sizing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alignments {
    /// Volatile (memory mode) capacity alignment
    pub volatile: u64,
    /// Persistent (AppDirect) capacity alignment
    pub persistent: u64,
    /// Volatile/persistent partition boundary alignment
    pub partition: u64,
}

impl Alignments {
    /// Alignments for the given partition granularity
    pub const fn for_granularity(granularity: AppDirectGranularity) -> Self {
        Self {
            volatile: GIB,
            persistent: GIB,
            partition: granularity.partition_alignment(),
        }
    }
}

impl Default for Alignments {
    fn default() -> Self {
        Self::for_granularity(AppDirectGranularity::default())
    }
}

/// Recommended far-memory to near-memory window
///
/// Far memory is the volatile persistent-module capacity, near memory the
/// DDR acting as its cache. Below `lower_bound` (FM/NM) the cache is
/// oversized, above `upper_bound` it is undersized. Near memory larger than
/// far memory is rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NmFmRatioPolicy {
    /// Whether the check runs at all
    pub enabled: bool,
    /// Smallest recommended FM/NM ratio
    pub lower_bound: u64,
    /// Largest recommended FM/NM ratio
    pub upper_bound: u64,
}

impl Default for NmFmRatioPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            lower_bound: 4,
            upper_bound: 16,
        }
    }
}

/// Label storage format version of the installed modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelVersion {
    /// Labels v1.1, 16-byte cookie records
    V1_1,
    /// Labels v1.2, 48-byte cookie records
    #[default]
    V1_2,
}

/// Region engine configuration
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Sizing alignments
    pub alignments: Alignments,
    /// NM:FM guidance
    pub nm_fm: NmFmRatioPolicy,
    /// Cookie format
    pub label_version: LabelVersion,
    /// Reject a reserve-DIMM request that names a single module
    pub reserve_dimm_requires_two: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            alignments: Alignments::default(),
            nm_fm: NmFmRatioPolicy::default(),
            label_version: LabelVersion::default(),
            reserve_dimm_requires_two: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the alignments implied by a partition granularity
    pub fn with_granularity(mut self, granularity: AppDirectGranularity) -> Self {
        self.alignments = Alignments::for_granularity(granularity);
        self
    }

    /// Override the alignments
    pub fn with_alignments(mut self, alignments: Alignments) -> Self {
        self.alignments = alignments;
        self
    }

    /// Override the NM:FM policy
    pub fn with_nm_fm(mut self, policy: NmFmRatioPolicy) -> Self {
        self.nm_fm = policy;
        self
    }

    /// Override the label version
    pub fn with_label_version(mut self, version: LabelVersion) -> Self {
        self.label_version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_alignments() {
        let config = EngineConfig::default();
        assert_eq!(config.alignments.volatile, GIB);
        assert_eq!(config.alignments.persistent, GIB);
        assert_eq!(config.alignments.partition, 32 * GIB);
    }

    #[test]
    fn test_granularity_override() {
        let config = EngineConfig::new().with_granularity(AppDirectGranularity::Gib1);
        assert_eq!(config.alignments.partition, GIB);
    }
}
