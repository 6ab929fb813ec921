//! Write submitter: immediate attempt with durable fallback.

use std::sync::Arc;
use std::time::Duration;

use fieldsync_common::time::Clock;
use fieldsync_domain::{ConflictInfo, ConflictKind, FieldSyncError, NewWrite, Result, SubmitRequest};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::sync::delivery::deliver;
use crate::sync::errors::ReplayError;
use crate::sync::notifications::{ConflictSubject, NotificationEmitter};
use crate::sync::operations::{OperationRegistry, RegisteredOperation};
use crate::sync::ports::{WriteRequest, WriteStore, WriteTransport};

/// What the caller learns about a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The server accepted the write.
    Accepted { status: u16, body: Option<Value> },
    /// Persisted locally; the coordinator will deliver it later.
    Queued { id: String },
    /// Client validation failure. Nothing was stored.
    Rejected { status: u16, message: String },
    /// The server reported a conflict on the first attempt. Nothing was stored.
    Conflict { kind: ConflictKind, info: ConflictInfo },
}

pub struct WriteSubmitter {
    store: Arc<dyn WriteStore>,
    transport: Arc<dyn WriteTransport>,
    registry: Arc<OperationRegistry>,
    emitter: Arc<NotificationEmitter>,
    online: watch::Receiver<bool>,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
}

impl WriteSubmitter {
    pub fn new(
        store: Arc<dyn WriteStore>,
        transport: Arc<dyn WriteTransport>,
        registry: Arc<OperationRegistry>,
        emitter: Arc<NotificationEmitter>,
        online: watch::Receiver<bool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            transport,
            registry,
            emitter,
            online,
            clock,
            request_timeout: Duration::from_secs(
                fieldsync_domain::constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Submit a mutating request.
    ///
    /// Unknown operation types fail fast. Storage failures are returned as
    /// errors and never reported as queued.
    #[instrument(skip(self, request), fields(operation_type = %request.operation_type))]
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome> {
        let operation = self.registry.resolve(&request.operation_type)?.clone();

        if !*self.online.borrow() {
            info!("Offline; queueing without a network attempt");
            let write = new_write(&operation, request.payload);
            return self.enqueue(write, &request.operation_type, request.item_count).await;
        }

        let wire = WriteRequest {
            method: operation.method.clone(),
            endpoint: operation.endpoint.clone(),
            payload: request.payload.clone(),
            idempotency_key: None,
        };
        let attempted_at = self.clock.utc_now();

        match deliver(self.transport.as_ref(), &wire, self.request_timeout).await {
            Ok(response) => {
                info!(status = response.status, "Write accepted");
                Ok(SubmitOutcome::Accepted { status: response.status, body: response.body })
            }
            Err(ReplayError::Validation { status, message }) => {
                warn!(status, message = %message, "Write rejected");
                self.emitter.rejected(&request.operation_type, &message);
                Ok(SubmitOutcome::Rejected { status, message })
            }
            Err(ReplayError::Conflict { kind, info, .. }) if kind.is_known() => {
                warn!(%kind, "Conflict on immediate attempt");
                let subject = ConflictSubject {
                    write_id: None,
                    operation_type: &request.operation_type,
                    payload: &request.payload,
                };
                self.emitter.conflict(subject, kind, &info);
                Ok(SubmitOutcome::Conflict { kind, info })
            }
            Err(err) => {
                warn!(error = %err, "Immediate attempt failed; queueing for retry");
                let write = new_write(&operation, request.payload).attempted_at(attempted_at);
                self.enqueue(write, &request.operation_type, request.item_count).await
            }
        }
    }

    async fn enqueue(
        &self,
        write: NewWrite,
        operation_type: &str,
        item_count: Option<u32>,
    ) -> Result<SubmitOutcome> {
        match self.store.enqueue(write).await {
            Ok(id) => {
                info!(write_id = %id, "Write queued");
                self.emitter.saved_offline(&id, operation_type, item_count);
                Ok(SubmitOutcome::Queued { id })
            }
            Err(err) => {
                error!(error = %err, "Failed to persist write");
                self.emitter.storage_failure("Your change could not be stored", &err.to_string());
                Err(match err {
                    FieldSyncError::Storage(_) => err,
                    other => FieldSyncError::Storage(other.to_string()),
                })
            }
        }
    }
}

fn new_write(operation: &RegisteredOperation, payload: Value) -> NewWrite {
    NewWrite::new(
        operation.operation_type.clone(),
        operation.endpoint.clone(),
        operation.module.clone(),
        payload,
    )
}

#[cfg(test)]
mod tests {
    use fieldsync_common::time::MockClock;
    use fieldsync_domain::{NotificationLevel, OperationConfig, WriteFilter, WriteStatus};
    use serde_json::json;

    use super::*;
    use crate::sync::memory::InMemoryWriteStore;
    use crate::sync::notifications::SAVED_OFFLINE_TITLE;
    use crate::sync::ports::TransportError;
    use crate::sync::testing::{RecordingSink, ScriptedTransport};

    struct Fixture {
        store: Arc<InMemoryWriteStore>,
        transport: Arc<ScriptedTransport>,
        sink: Arc<RecordingSink>,
        online: watch::Sender<bool>,
        submitter: WriteSubmitter,
    }

    fn fixture(online: bool) -> Fixture {
        let store = Arc::new(InMemoryWriteStore::new());
        let transport = Arc::new(ScriptedTransport::new());
        let sink = Arc::new(RecordingSink::new());
        let emitter = Arc::new(NotificationEmitter::new(sink.clone()));
        let registry = OperationRegistry::from_config(&[OperationConfig {
            operation_type: "submit_stock_count".into(),
            endpoint: "/api/stock-counts".into(),
            module: "inventory".into(),
            method: "POST".into(),
        }])
        .unwrap();
        let (tx, rx) = watch::channel(online);
        let submitter = WriteSubmitter::new(
            store.clone(),
            transport.clone(),
            Arc::new(registry),
            emitter,
            rx,
            Arc::new(MockClock::new()),
        );
        Fixture { store, transport, sink, online: tx, submitter }
    }

    fn count(items: u32) -> SubmitRequest {
        SubmitRequest::new("submit_stock_count", json!({"lines": items})).with_item_count(items)
    }

    #[tokio::test]
    async fn offline_submission_is_queued_without_network() {
        let f = fixture(false);
        let outcome = f.submitter.submit(count(5)).await.unwrap();

        let SubmitOutcome::Queued { id } = outcome else { panic!("expected queued") };
        let stored = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, WriteStatus::Queued);
        assert_eq!(stored.attempt_count, 0);
        assert_eq!(stored.last_attempt_at, None);
        assert_eq!(f.transport.request_count(), 0);

        let n = f.sink.last().unwrap();
        assert_eq!(n.title, SAVED_OFFLINE_TITLE);
        assert!(n.description.contains("5 items"));
        drop(f.online);
    }

    #[tokio::test]
    async fn success_is_not_queued() {
        let f = fixture(true);
        f.transport.push_status(201, Some(json!({"id": "srv-9"})));

        let outcome = f.submitter.submit(count(2)).await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Accepted { status: 201, body: Some(json!({"id": "srv-9"})) }
        );
        assert!(f.store.list(&WriteFilter::all()).await.unwrap().is_empty());
        assert!(f.sink.notifications().is_empty());
    }

    #[tokio::test]
    async fn transient_failure_queues_with_one_attempt() {
        let f = fixture(true);
        f.transport.push_status(503, None);

        let SubmitOutcome::Queued { id } = f.submitter.submit(count(1)).await.unwrap() else {
            panic!("expected queued");
        };
        let stored = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert!(stored.last_attempt_at.is_some());

        f.transport.push_error(TransportError::Network("dns failure".into()));
        assert!(matches!(f.submitter.submit(count(1)).await, Ok(SubmitOutcome::Queued { .. })));
    }

    #[tokio::test]
    async fn validation_failure_is_rejected_and_not_queued() {
        let f = fixture(true);
        f.transport.push_status(422, Some(json!({"message": "count must be >= 0"})));

        let outcome = f.submitter.submit(count(3)).await.unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::Rejected { status: 422, message: "count must be >= 0".into() }
        );
        assert!(f.store.list(&WriteFilter::all()).await.unwrap().is_empty());
        assert_eq!(f.sink.count_at(NotificationLevel::Error), 1);
    }

    #[tokio::test]
    async fn known_conflict_is_returned_not_queued() {
        let f = fixture(true);
        f.transport
            .push_status(409, Some(json!({"conflict": {"kind": "duplicate", "actor": "Alice"}})));

        let outcome = f.submitter.submit(count(3)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Conflict { kind: ConflictKind::Duplicate, .. }));
        assert!(f.store.list(&WriteFilter::all()).await.unwrap().is_empty());
        assert_eq!(f.sink.last().unwrap().level, NotificationLevel::Info);
    }

    #[tokio::test]
    async fn unknown_conflict_is_queued() {
        let f = fixture(true);
        f.transport.push_status(409, None);
        assert!(matches!(f.submitter.submit(count(3)).await, Ok(SubmitOutcome::Queued { .. })));
    }

    #[tokio::test]
    async fn unknown_operation_fails_fast() {
        let f = fixture(true);
        let err = f.submitter.submit(SubmitRequest::new("log_waste", json!({}))).await.unwrap_err();
        assert!(matches!(err, FieldSyncError::UnknownOperation(_)));
        assert_eq!(f.transport.request_count(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced_not_queued() {
        let f = fixture(false);
        f.store.set_failing(true);

        let err = f.submitter.submit(count(5)).await.unwrap_err();
        assert!(err.is_storage());
        let n = f.sink.last().unwrap();
        assert_eq!(n.level, NotificationLevel::Error);
        assert_ne!(n.title, SAVED_OFFLINE_TITLE);
    }
}
