use std::time::Duration;

use fieldsync_domain::FieldSyncError;
use tracing::{info, warn};

/// Log the outcome of a command execution with structured fields.
///
/// `command` should be a stable identifier such as `"queue::submit"`.
#[inline]
pub fn log_command_execution(command: &str, elapsed: Duration, success: bool) {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    if success {
        info!(command, duration_ms, "command_execution_success");
    } else {
        warn!(command, duration_ms, "command_execution_failure");
    }
}

/// Stable label for a `FieldSyncError`, suitable for logs and exit codes.
#[inline]
pub fn error_label(error: &FieldSyncError) -> &'static str {
    match error {
        FieldSyncError::Storage(_) => "storage",
        FieldSyncError::Config(_) => "config",
        FieldSyncError::Network(_) => "network",
        FieldSyncError::Timeout(_) => "timeout",
        FieldSyncError::Server(_) => "server",
        FieldSyncError::Validation(_) => "validation",
        FieldSyncError::NotFound(_) => "not_found",
        FieldSyncError::InvalidTransition(_) => "invalid_transition",
        FieldSyncError::UnknownOperation(_) => "unknown_operation",
        FieldSyncError::Internal(_) => "internal",
    }
}
