//! Conflict classification results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why the server rejected a replayed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// The action was already performed.
    Duplicate,
    /// The target changed since the write was captured.
    Version,
    /// The target no longer exists.
    Deleted,
    /// The user lacks permission for the action.
    Unauthorized,
    /// Conflict-shaped but unrecognized; treated as transient.
    Unknown,
}

crate::impl_domain_status_conversions!(ConflictKind {
    Duplicate => "duplicate",
    Version => "version",
    Deleted => "deleted",
    Unauthorized => "unauthorized",
    Unknown => "unknown",
});

impl ConflictKind {
    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Context pulled from a conflict body for user-facing messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    /// Who performed the conflicting action, when the server says.
    pub actor: Option<String>,
    /// When the conflicting action happened, as reported by the server.
    pub at: Option<String>,
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_case_insensitively() {
        assert_eq!("DUPLICATE".parse::<ConflictKind>(), Ok(ConflictKind::Duplicate));
        assert_eq!(ConflictKind::Unauthorized.to_string(), "unauthorized");
        assert!(!ConflictKind::Unknown.is_known());
        assert!(ConflictKind::Version.is_known());
    }
}
