//! Crate-wide log macros.
//!
//! Every event goes to `tracing` under the [`TARGET`] target, so a subscriber
//! can filter the live leaderboard client with `contest_live_client=<level>`
//! regardless of which module logged.

#[doc(hidden)]
pub use tracing as __tracing;

/// Target shared by all events this crate emits.
pub const TARGET: &str = "contest_live_client";

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::info!(target: $crate::logging::TARGET, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::warn!(target: $crate::logging::TARGET, $($arg)*)
    };
}

/// Also used for panics caught around consumer callbacks.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::error!(target: $crate::logging::TARGET, $($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::__tracing::debug!(target: $crate::logging::TARGET, $($arg)*)
    };
}
