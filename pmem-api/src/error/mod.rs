//! Error handling for persistent memory management

use alloc::format;
use alloc::string::{String, ToString};
use core::fmt;

/// Common error type used throughout the pmem crates
///
/// The variants mirror the return classes that management tooling tells
/// apart. The finer-grained reason travels separately as an
/// [`NvmStatusCode`](crate::NvmStatusCode) in the request's
/// [`CommandStatus`](crate::CommandStatus).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or contradictory request
    InvalidParameter(String),
    /// Request is well formed but cannot be realized
    Aborted(String),
    /// Platform or configuration does not support the request
    Unsupported(String),
    /// Inconsistent device data or an internal accounting failure
    DeviceError(String),
    /// Referenced object does not exist
    NotFound(String),
    /// Ran out of a bounded resource
    OutOfResources(String),
    /// Required firmware table is missing
    LoadError(String),
    /// No interleave layout fits the remaining modules
    AlignmentError(String),
    /// Operation requires state that has not been established
    NotStarted(String),
    /// Every reducible byte was consumed; carries the excess left over
    CapacityExhausted(u64),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            Error::Aborted(msg) => write!(f, "Aborted: {}", msg),
            Error::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            Error::DeviceError(msg) => write!(f, "Device error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::OutOfResources(msg) => write!(f, "Out of resources: {}", msg),
            Error::LoadError(msg) => write!(f, "Load error: {}", msg),
            Error::AlignmentError(msg) => write!(f, "Alignment error: {}", msg),
            Error::NotStarted(msg) => write!(f, "Not started: {}", msg),
            Error::CapacityExhausted(left) => {
                write!(f, "Capacity exhausted: {} bytes left unreduced", left)
            }
        }
    }
}

impl Error {
    /// Returns the message carried by the error
    pub fn message(&self) -> &str {
        match self {
            Error::InvalidParameter(msg)
            | Error::Aborted(msg)
            | Error::Unsupported(msg)
            | Error::DeviceError(msg)
            | Error::NotFound(msg)
            | Error::OutOfResources(msg)
            | Error::LoadError(msg)
            | Error::AlignmentError(msg)
            | Error::NotStarted(msg) => msg,
            Error::CapacityExhausted(_) => "reducible capacity exhausted",
        }
    }

    fn map_message(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            Error::InvalidParameter(msg) => Error::InvalidParameter(f(msg)),
            Error::Aborted(msg) => Error::Aborted(f(msg)),
            Error::Unsupported(msg) => Error::Unsupported(f(msg)),
            Error::DeviceError(msg) => Error::DeviceError(f(msg)),
            Error::NotFound(msg) => Error::NotFound(f(msg)),
            Error::OutOfResources(msg) => Error::OutOfResources(f(msg)),
            Error::LoadError(msg) => Error::LoadError(f(msg)),
            Error::AlignmentError(msg) => Error::AlignmentError(f(msg)),
            Error::NotStarted(msg) => Error::NotStarted(f(msg)),
            Error::CapacityExhausted(left) => Error::CapacityExhausted(left),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type for operations that can fail
pub type Result<T> = core::result::Result<T, Error>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Prefixes the error message, keeping the error class
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|error| error.map_message(|msg| format!("{}: {}", context, msg)))
    }
}

/// Creates a new invalid parameter error
pub fn invalid_parameter(msg: &str) -> Error {
    Error::InvalidParameter(msg.to_string())
}

/// Creates a new aborted error
pub fn aborted(msg: &str) -> Error {
    Error::Aborted(msg.to_string())
}

/// Creates a new unsupported error
pub fn unsupported(msg: &str) -> Error {
    Error::Unsupported(msg.to_string())
}

/// Creates a new device error
pub fn device_error(msg: &str) -> Error {
    Error::DeviceError(msg.to_string())
}

/// Creates a new not found error
pub fn not_found(msg: &str) -> Error {
    Error::NotFound(msg.to_string())
}

/// Creates a new out of resources error
pub fn out_of_resources(msg: &str) -> Error {
    Error::OutOfResources(msg.to_string())
}

/// Creates a new load error
pub fn load_error(msg: &str) -> Error {
    Error::LoadError(msg.to_string())
}

/// Creates a new alignment error
pub fn alignment_error(msg: &str) -> Error {
    Error::AlignmentError(msg.to_string())
}
