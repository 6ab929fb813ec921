//! Replay error taxonomy
//!
//! Every failed submission or replay is mapped into one [`ReplayError`],
//! and the classification decides between retrying, terminating and
//! surfacing the failure to the user.

use std::time::Duration;

use fieldsync_common::error::{ErrorClassification, ErrorSeverity};
use fieldsync_domain::{ConflictInfo, ConflictKind, FieldSyncError};
use thiserror::Error;

use crate::sync::ports::TransportError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReplayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Client validation failure. Never enqueued, never retried.
    #[error("Rejected with {status}: {message}")]
    Validation { status: u16, message: String },

    #[error("Conflict ({kind}) with status {status}")]
    Conflict { kind: ConflictKind, status: u16, info: ConflictInfo },

    /// Local persistence failed; the most severe category.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ReplayError {
    /// True for failures that go back to the queue with backoff.
    pub fn is_transient(&self) -> bool {
        self.is_retryable()
    }

    /// Human-readable reason suitable for the stored `error` field.
    pub fn reason(&self) -> String {
        match self {
            Self::Conflict { info, kind, .. } => {
                info.message.clone().unwrap_or_else(|| format!("{kind} conflict"))
            }
            Self::Validation { message, .. } | Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<TransportError> for ReplayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(message) => Self::Network(message),
            TransportError::Timeout(duration) => Self::Timeout(duration),
        }
    }
}

impl From<FieldSyncError> for ReplayError {
    fn from(err: FieldSyncError) -> Self {
        match err {
            FieldSyncError::Network(message) => Self::Network(message),
            FieldSyncError::Timeout(message) => Self::Network(message),
            FieldSyncError::Server(message) => Self::Server { status: 500, message },
            FieldSyncError::Validation(message) => Self::Validation { status: 400, message },
            other => Self::Storage(other.to_string()),
        }
    }
}

impl ErrorClassification for ReplayError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } => true,
            Self::Conflict { kind, .. } => !kind.is_known(),
            Self::Validation { .. } | Self::Storage(_) => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } => ErrorSeverity::Warning,
            Self::Validation { .. } => ErrorSeverity::Error,
            Self::Conflict { kind, .. } => match kind {
                ConflictKind::Duplicate => ErrorSeverity::Info,
                ConflictKind::Version | ConflictKind::Unknown => ErrorSeverity::Warning,
                ConflictKind::Deleted | ConflictKind::Unauthorized => ErrorSeverity::Error,
            },
            Self::Storage(_) => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }
}
