//! Scripted port implementations for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use fieldsync_domain::{Notification, NotificationLevel};
use serde_json::Value;

use crate::sync::ports::{
    NotificationSink, TransportError, TransportResponse, WriteRequest, WriteTransport,
};

type Scripted = Result<TransportResponse, TransportError>;

/// Transport that replays scripted outcomes and records every request.
///
/// Endpoint-specific scripts are consumed first, then the shared script;
/// once both are empty every request succeeds with `200`.
#[derive(Default)]
pub struct ScriptedTransport {
    shared: Mutex<VecDeque<Scripted>>,
    by_endpoint: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<WriteRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every response, measured on the tokio clock.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push_status(&self, status: u16, body: Option<Value>) {
        lock(&self.shared).push_back(Ok(TransportResponse::new(status, body)));
    }

    pub fn push_error(&self, error: TransportError) {
        lock(&self.shared).push_back(Err(error));
    }

    /// Script a response for one endpoint only.
    pub fn push_for(&self, endpoint: &str, status: u16, body: Option<Value>) {
        lock(&self.by_endpoint)
            .entry(endpoint.to_string())
            .or_default()
            .push_back(Ok(TransportResponse::new(status, body)));
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<WriteRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }
}

#[async_trait]
impl WriteTransport for ScriptedTransport {
    async fn send(&self, request: &WriteRequest) -> Result<TransportResponse, TransportError> {
        lock(&self.requests).push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let endpoint_script =
            lock(&self.by_endpoint).get_mut(&request.endpoint).and_then(VecDeque::pop_front);
        endpoint_script
            .or_else(|| lock(&self.shared).pop_front())
            .unwrap_or_else(|| Ok(TransportResponse::new(200, None)))
    }
}

/// Sink that keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.received).clone()
    }

    pub fn count_at(&self, level: NotificationLevel) -> usize {
        lock(&self.received).iter().filter(|n| n.level == level).count()
    }

    pub fn last(&self) -> Option<Notification> {
        lock(&self.received).last().cloned()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, notification: Notification) {
        lock(&self.received).push(notification);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
