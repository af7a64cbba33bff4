//! PMEM API
//!
//! Shared vocabulary for persistent memory management crates: the error
//! type, the command status taxonomy reported back to management tools,
//! module identity types and the platform ceilings every planner honours.
//!
//! # Architecture
//!
//! - **Error**: crate-wide [`Error`] enum and [`Result`] alias
//! - **Status**: [`NvmStatusCode`] codes and the per-request [`CommandStatus`]
//! - **Types**: DIMM/socket identity, size units and alignment helpers
//! - **Collections**: `no_std` map re-exports
//! - **Logging**: `pmem_*` macros backed by the `log` facade
//!
//! # Usage
//!
//! ```rust
//! use pmem_api::{CommandStatus, NvmStatusCode, ObjectId, DimmId};
//!
//! let mut status = CommandStatus::new();
//! status.set_object_status(ObjectId::Dimm(DimmId(0x0001)), NvmStatusCode::RegionNoGoalExistsOnDimm);
//! assert!(status.object_codes(ObjectId::Dimm(DimmId(0x0001))).count() == 1);
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod collections;
pub mod error;
pub mod logging;
pub mod status;
pub mod types;

pub use error::{
    Error, ErrorContext, Result, aborted, alignment_error, device_error, invalid_parameter,
    load_error, not_found, out_of_resources, unsupported,
};
pub use status::{CommandStatus, NvmStatusCode, ObjectId, ObjectStatus};
pub use types::{
    DimmId, DimmUid, SocketId, GIB, KIB, MIB, MAX_DIMMS, MAX_DIMMS_PER_SOCKET, MAX_IS_CONFIGS,
    MAX_IS_PER_DIMM, MAX_IS_PER_SOCKET, MAX_SOCKETS, is_aligned, round_down, round_up,
};
