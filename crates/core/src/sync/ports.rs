//! Port interfaces for the sync subsystem

use std::time::Duration;

use async_trait::async_trait;
use fieldsync_domain::{
    NewWrite, Notification, PendingWrite, QueueSummary, Result, WriteFilter, WritePatch,
};
use serde_json::Value;
use thiserror::Error;

/// Durable write store.
///
/// Implementations serialize every mutation through one internal lock so
/// concurrent callers cannot interleave partial updates or reorder entries.
#[async_trait]
pub trait WriteStore: Send + Sync {
    /// Persist a new write as `queued` and return its generated id.
    async fn enqueue(&self, write: NewWrite) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<PendingWrite>>;

    /// Entries matching `filter`, oldest first.
    async fn list(&self, filter: &WriteFilter) -> Result<Vec<PendingWrite>>;

    /// Apply a partial update.
    ///
    /// Returns the updated entry, or `None` when the patch resolved (and
    /// therefore deleted) it. Unknown ids yield `NotFound`.
    async fn update(&self, id: &str, patch: WritePatch) -> Result<Option<PendingWrite>>;

    /// Delete an entry regardless of status. Unknown ids yield `NotFound`.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Revert entries left `submitting` by a crash to `queued`, counting the
    /// interrupted attempt. Returns how many were recovered.
    async fn recover_interrupted(&self) -> Result<usize>;

    /// User-facing deletion of a `failed` entry.
    async fn dismiss(&self, id: &str) -> Result<()>;

    async fn summary(&self) -> Result<QueueSummary>;
}

/// One HTTP call to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub method: String,
    pub endpoint: String,
    pub payload: Value,
    /// Sent as the `Idempotency-Key` header when present.
    pub idempotency_key: Option<String>,
}

/// Status and parsed JSON body of a completed call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The call never produced a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// Delivers write requests to the backend.
#[async_trait]
pub trait WriteTransport: Send + Sync {
    async fn send(
        &self,
        request: &WriteRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Receives structured user-facing messages.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}
