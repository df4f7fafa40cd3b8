//! Logging infrastructure.
//!
//! All events go through `tracing` with target "rowguard" and carry an
//! `event` field for filtering.
//!
//! ## Library Integration
//!
//! The crate never initializes a global subscriber. Applications configure
//! tracing via `tracing_subscriber` or similar.
//!
//! ## Conventions
//!
//! - `event`: snake_case event name (required)
//! - `component`: subsystem (e.g., "lookup", "workspace", "txn", "catalog")
//! - Use `%` for Display, `?` for Debug formatting
//! - Per-object events stay at debug level

/// Target for all log events emitted by this crate.
pub(crate) const ROWGUARD_TARGET: &str = "rowguard";

/// Macro for info-level log events.
///
/// # Example
/// ```ignore
/// log_info!(
///     component = "workspace",
///     event = "objects_registered",
///     object = %stats.id(),
///     rows = stats.rows(),
/// );
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::ROWGUARD_TARGET, $($field)*)
    };
}

/// Macro for debug-level log events.
macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::ROWGUARD_TARGET, $($field)*)
    };
}

/// Macro for warn-level log events.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::ROWGUARD_TARGET, $($field)*)
    };
}

/// Macro for error-level log events.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::ROWGUARD_TARGET, $($field)*)
    };
}

pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_warn;
