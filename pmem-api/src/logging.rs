//! Unified logging support for the pmem crates
//!
//! The macros forward to the `log` facade when the *calling* crate enables
//! its `log` feature. Without it the arguments are still type-checked and
//! marked as used, then compiled away.

/// Trace-level logging
#[macro_export]
macro_rules! pmem_trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::trace!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = ::core::format_args!($($arg)*); }
    }
}

/// Debug-level logging
#[macro_export]
macro_rules! pmem_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::debug!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = ::core::format_args!($($arg)*); }
    }
}

/// Info-level logging
#[macro_export]
macro_rules! pmem_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::info!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = ::core::format_args!($($arg)*); }
    }
}

/// Warn-level logging
#[macro_export]
macro_rules! pmem_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::warn!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = ::core::format_args!($($arg)*); }
    }
}

/// Error-level logging
#[macro_export]
macro_rules! pmem_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::error!($($arg)*);
        #[cfg(not(feature = "log"))]
        { let _ = ::core::format_args!($($arg)*); }
    }
}
