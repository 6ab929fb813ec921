//! Pending write records and the patch/filter types used to mutate them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::MAX_ERROR_LENGTH;
use crate::{FieldSyncError, Result};

/// Lifecycle status of a pending write
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteStatus {
    /// Waiting for a drain cycle.
    Queued,
    /// A replay is in flight.
    Submitting,
    /// Terminal until a user dismisses it.
    Failed,
    /// Delivered or superseded. Never persisted.
    Resolved,
}

crate::impl_domain_status_conversions!(WriteStatus {
    Queued => "queued",
    Submitting => "submitting",
    Failed => "failed",
    Resolved => "resolved",
});

/// A durably queued mutating operation awaiting delivery.
///
/// This is the persisted record shape; field names serialize in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWrite {
    pub id: String,
    pub operation_type: String,
    pub endpoint: String,
    pub module: String,
    pub payload: Value,
    pub status: WriteStatus,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PendingWrite {
    /// Generate a new time-ordered write id.
    pub fn generate_id() -> String {
        Uuid::now_v7().to_string()
    }

    /// Build the queued record for a freshly enqueued write.
    pub fn from_new(id: String, write: NewWrite, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            operation_type: write.operation_type,
            endpoint: write.endpoint,
            module: write.module,
            payload: write.payload,
            status: WriteStatus::Queued,
            attempt_count: write.attempt_count,
            created_at,
            last_attempt_at: write.last_attempt_at,
            error: None,
        }
    }

    /// Apply a partial update in place.
    ///
    /// Rejects a transition to `submitting` for an entry already in flight.
    /// Any status other than `failed` clears the stored error.
    pub fn apply_patch(&mut self, patch: &WritePatch) -> Result<()> {
        if patch.status == Some(WriteStatus::Submitting) && self.status == WriteStatus::Submitting
        {
            return Err(FieldSyncError::InvalidTransition(format!(
                "write {} is already submitting",
                self.id
            )));
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(attempt_count) = patch.attempt_count {
            self.attempt_count = attempt_count;
        }
        if let Some(last_attempt_at) = patch.last_attempt_at {
            self.last_attempt_at = Some(last_attempt_at);
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        if self.status != WriteStatus::Failed {
            self.error = None;
        }
        Ok(())
    }
}

/// What callers hand to `enqueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWrite {
    pub operation_type: String,
    pub endpoint: String,
    pub module: String,
    pub payload: Value,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl NewWrite {
    pub fn new(
        operation_type: impl Into<String>,
        endpoint: impl Into<String>,
        module: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            endpoint: endpoint.into(),
            module: module.into(),
            payload,
            attempt_count: 0,
            last_attempt_at: None,
        }
    }

    /// Record a failed immediate attempt made at `at`.
    #[must_use]
    pub fn attempted_at(mut self, at: DateTime<Utc>) -> Self {
        self.attempt_count = 1;
        self.last_attempt_at = Some(at);
        self
    }
}

/// Partial update of a pending write. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritePatch {
    pub status: Option<WriteStatus>,
    pub attempt_count: Option<u32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WritePatch {
    /// Mark the entry in flight and stamp the attempt time.
    pub fn submitting(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(WriteStatus::Submitting),
            last_attempt_at: Some(at),
            ..Self::default()
        }
    }

    /// Return the entry to the queue with an updated attempt count.
    pub fn requeue(attempt_count: u32) -> Self {
        Self {
            status: Some(WriteStatus::Queued),
            attempt_count: Some(attempt_count),
            ..Self::default()
        }
    }

    /// Mark the entry failed; the description is truncated for storage.
    pub fn failed(error: &str) -> Self {
        Self {
            status: Some(WriteStatus::Failed),
            error: Some(truncate_error(error)),
            ..Self::default()
        }
    }

    pub fn resolved() -> Self {
        Self { status: Some(WriteStatus::Resolved), ..Self::default() }
    }

    #[must_use]
    pub fn with_attempt_count(mut self, attempt_count: u32) -> Self {
        self.attempt_count = Some(attempt_count);
        self
    }
}

/// Selects entries for `list`. Results are always in enqueue order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteFilter {
    pub statuses: Option<BTreeSet<WriteStatus>>,
    pub module: Option<String>,
}

impl WriteFilter {
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_status(mut self, status: WriteStatus) -> Self {
        self.statuses.get_or_insert_with(BTreeSet::new).insert(status);
        self
    }

    #[must_use]
    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn matches(&self, write: &PendingWrite) -> bool {
        let status_ok = self.statuses.as_ref().map_or(true, |set| set.contains(&write.status));
        let module_ok = self.module.as_deref().map_or(true, |m| m == write.module);
        status_ok && module_ok
    }
}

/// Counts per status for a status surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub queued: usize,
    pub submitting: usize,
    pub failed: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
}

impl QueueSummary {
    pub fn from_writes<'a>(writes: impl IntoIterator<Item = &'a PendingWrite>) -> Self {
        let mut summary = Self::default();
        for write in writes {
            match write.status {
                WriteStatus::Queued => summary.queued += 1,
                WriteStatus::Submitting => summary.submitting += 1,
                WriteStatus::Failed => summary.failed += 1,
                WriteStatus::Resolved => continue,
            }
            summary.oldest_created_at = Some(match summary.oldest_created_at {
                Some(oldest) if oldest <= write.created_at => oldest,
                _ => write.created_at,
            });
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.queued + self.submitting + self.failed
    }
}

/// A caller's mutating request handed to the write submitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub operation_type: String,
    pub payload: Value,
    /// Number of line items, used only in user-facing messages.
    #[serde(default)]
    pub item_count: Option<u32>,
}

impl SubmitRequest {
    pub fn new(operation_type: impl Into<String>, payload: Value) -> Self {
        Self { operation_type: operation_type.into(), payload, item_count: None }
    }

    #[must_use]
    pub fn with_item_count(mut self, item_count: u32) -> Self {
        self.item_count = Some(item_count);
        self
    }
}

fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LENGTH {
        return error.to_string();
    }

    let mut truncated = error.chars().take(MAX_ERROR_LENGTH.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}
