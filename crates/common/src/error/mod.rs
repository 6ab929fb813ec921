//! Common error types and classification shared by FieldSync crates.
//!
//! The error handling system is built on three pieces:
//!
//! 1. **`CommonError`**: error patterns that appear in more than one crate
//!    (configuration, timeouts, storage, internal invariants).
//! 2. **`ErrorClassification` trait**: a standard interface for classifying
//!    errors by retryability, severity and criticality.
//! 3. **`ErrorSeverity` enum**: a severity scale used for logging and for
//!    picking the level of user-facing notifications.
//!
//! Module-specific errors should compose with `CommonError` rather than
//! duplicating its variants:
//!
//! ```rust,ignore
//! #[derive(Debug, Error)]
//! pub enum MyModuleError {
//!     #[error("Invalid widget configuration: {0}")]
//!     InvalidWidget(String),
//!
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//! }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    /// Configuration-related errors
    #[error("Configuration error{}: {message}", field_suffix(.field.as_deref()))]
    Config { message: String, field: Option<String> },

    /// Timeout errors
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Storage/database errors
    #[error("Storage error{}: {message}", operation_suffix(.operation.as_deref()))]
    Storage { message: String, operation: Option<String> },

    /// Internal errors that shouldn't normally occur
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn field_suffix(field: Option<&str>) -> String {
    field.map(|f| format!(" in field '{f}'")).unwrap_or_default()
}

fn operation_suffix(operation: Option<&str>) -> String {
    operation.map(|op| format!(" during {op}")).unwrap_or_default()
}

impl CommonError {
    /// Configuration error without a specific field.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: None }
    }

    /// Configuration error attributed to a named field.
    pub fn config_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { message: message.into(), field: Some(field.into()) }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage { message: message.into(), operation: None }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }
}

/// Result alias for operations returning [`CommonError`].
pub type CommonResult<T> = Result<T, CommonError>;

/// Standard interface for classifying errors.
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are transient issues that may succeed if attempted
    /// again, such as network timeouts or temporary server unavailability.
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    ///
    /// Critical errors indicate possible data loss or corruption.
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    fn retry_after(&self) -> Option<Duration>;
}

/// Error severity levels for logging and notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Config { .. } | Self::Internal { .. } => ErrorSeverity::Error,
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Storage { .. } => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_mentions_field() {
        let err = CommonError::config_field("max_attempts", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Configuration error in field 'max_attempts': must be at least 1"
        );

        let bare = CommonError::config("missing base url");
        assert_eq!(bare.to_string(), "Configuration error: missing base url");
    }

    #[test]
    fn storage_errors_are_critical_and_not_retryable() {
        let err = CommonError::storage("disk full");
        assert!(err.is_critical());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn timeouts_are_retryable_warnings() {
        let err = CommonError::timeout("submit", Duration::from_secs(15));
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert!(err.to_string().contains("15s"));
    }

    #[test]
    fn severity_ordering_and_display() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}
