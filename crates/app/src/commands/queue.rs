//! Queue commands: submit, inspect and dismiss pending writes.

use std::time::Instant;

use fieldsync_core::SubmitOutcome;
use fieldsync_domain::{
    PendingWrite, QueueSummary, Result, SubmitRequest, WriteFilter, WriteStatus,
};
use fieldsync_infra::observability::metrics::SyncMetricsSnapshot;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::context::AppContext;
use crate::utils::logging::log_command_execution;

/// Queue state for a status surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub summary: QueueSummary,
    pub online: bool,
    pub operations: usize,
    pub metrics: SyncMetricsSnapshot,
}

/// Submit one write: immediate attempt when the backend answers its health
/// probe, otherwise straight to the durable queue.
pub async fn submit(
    ctx: &AppContext,
    operation_type: &str,
    payload: Value,
    item_count: Option<u32>,
) -> Result<SubmitOutcome> {
    let start = Instant::now();
    let online = ctx.check_connectivity().await;
    info!(command = "queue::submit", operation_type, online, "Executing submit");

    let mut request = SubmitRequest::new(operation_type, payload);
    request.item_count = item_count;
    let result = ctx.submitter.submit(request).await;

    log_command_execution("queue::submit", start.elapsed(), result.is_ok());
    result
}

pub async fn status(ctx: &AppContext) -> Result<StatusReport> {
    let start = Instant::now();
    let online = ctx.check_connectivity().await;
    let result = ctx.store.summary().await.map(|summary| StatusReport {
        summary,
        online,
        operations: ctx.registry.len(),
        metrics: ctx.metrics.snapshot(),
    });

    log_command_execution("queue::status", start.elapsed(), result.is_ok());
    result
}

/// Entries in enqueue order, optionally narrowed by status and module.
pub async fn list(
    ctx: &AppContext,
    status: Option<WriteStatus>,
    module: Option<String>,
) -> Result<Vec<PendingWrite>> {
    let start = Instant::now();
    let mut filter = WriteFilter::all();
    if let Some(status) = status {
        filter = filter.with_status(status);
    }
    if let Some(module) = module {
        filter = filter.in_module(module);
    }

    let result = ctx.store.list(&filter).await;
    log_command_execution("queue::list", start.elapsed(), result.is_ok());
    result
}

/// Remove a `failed` entry. Anything else is an invalid transition.
pub async fn dismiss(ctx: &AppContext, id: &str) -> Result<()> {
    let start = Instant::now();
    let result = ctx.store.dismiss(id).await;
    if result.is_ok() {
        ctx.emitter.forget(id);
        info!(write_id = id, "Dismissed failed write");
    }

    log_command_execution("queue::dismiss", start.elapsed(), result.is_ok());
    result
}
