//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for FieldSync
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum FieldSyncError {
    /// Local persistence failed; the write may not be durable.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FieldSyncError {
    /// True for failures of the local durable store.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

/// Result type alias for FieldSync operations
pub type Result<T> = std::result::Result<T, FieldSyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let err = FieldSyncError::NotFound("write 42".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "NotFound");
        assert_eq!(json["message"], "write 42");

        let back: FieldSyncError = serde_json::from_value(json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn display_includes_category() {
        let err = FieldSyncError::Storage("disk I/O error".to_string());
        assert_eq!(err.to_string(), "Storage error: disk I/O error");
        assert!(err.is_storage());
        assert!(!FieldSyncError::Network("offline".into()).is_storage());
    }
}
