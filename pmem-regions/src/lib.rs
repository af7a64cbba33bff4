//! PMEM Regions
//!
//! Region goal planning and interleave set reconstruction for persistent
//! memory modules. The engine turns a capacity request (volatile percent,
//! reserved percent, persistent layout) into per-module region goals that
//! firmware applies at the next boot, and rebuilds the interleave sets
//! currently configured from each module's platform config data and the
//! NFIT.
//!
//! # Architecture
//!
//! - **Inventory**: [`dimm`] modules with their current config and goal state
//! - **Platform**: [`platform`] capability tables and the [`topology`] matcher
//! - **Planning**: [`template`] capacity splits, [`reduce`] SKU limits,
//!   [`interleave`] grouping and [`goal`] storage
//! - **Verification**: [`verify`] platform, SKU and topology rules
//! - **Current config**: [`region`] interleave sets, rebuilt by [`reconstruct`]
//!   from [`pcd`] records
//! - **Lifecycle**: [`orchestrator`] create, delete, apply and retrieve
//!
//! # Usage
//!
//! ```rust
//! use pmem_api::{CommandStatus, DimmId, DimmUid, SocketId, GIB};
//! use pmem_regions::{
//!     CreateGoalRequest, Dimm, DimmInventory, DimmLocation, EngineConfig, PlatformCapabilities,
//!     RegionContext, create_goal_config,
//! };
//!
//! let dimms = (0..2u32)
//!     .map(|n| {
//!         let uid = DimmUid { vendor_id: 0x8089, serial_number: n + 1, ..Default::default() };
//!         let location = DimmLocation { socket: SocketId(0), imc: n as u8, channel: 0, channel_position: 0 };
//!         Dimm::new(DimmId(n + 1), uid, location, 128 * GIB)
//!     })
//!     .collect();
//! let inventory = DimmInventory::new(dimms).unwrap();
//! let mut ctx = RegionContext::new(inventory, PlatformCapabilities::default(), EngineConfig::default());
//!
//! let mut status = CommandStatus::new();
//! let plan = create_goal_config(&mut ctx, &CreateGoalRequest::new(), &mut status).unwrap();
//! assert_eq!(plan.handles.len(), 1);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod config;
pub mod dimm;
pub mod goal;
pub mod interleave;
pub mod orchestrator;
pub mod pcd;
pub mod platform;
pub mod reconstruct;
pub mod reduce;
pub mod region;
pub mod template;
pub mod topology;
pub mod verify;

pub use config::{Alignments, AppDirectGranularity, EngineConfig, LabelVersion, NmFmRatioPolicy};
pub use dimm::{Dimm, DimmInventory, DimmLocation, GoalConfigStatus, SkuCapabilities};
pub use goal::{DriverPreferences, GoalArena, GoalHandle, InterleaveSetType, RegionGoal};
pub use orchestrator::{
    CreateGoalRequest, GoalPlan, RegionContext, ReserveDimmType, apply_goal_configs, create_goal_config,
    delete_goal_configs, resolve_goal_status, retrieve_goal_configs,
};
pub use pcd::{ConfigSender, PlatformConfigData, PlatformConfigSource};
pub use platform::{ChannelWays, InterleaveSize, PlatformCapabilities};
pub use reconstruct::{NfitTables, SpaRange, SpaRangeKind};
pub use region::{InterleaveSet, IsState};
pub use template::PersistentMemoryType;
pub use topology::Topology;
