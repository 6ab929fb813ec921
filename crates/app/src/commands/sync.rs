//! Sync commands: one-shot flush and the long-running sync loop.

use std::future::Future;
use std::time::Instant;

use fieldsync_core::DrainReport;
use fieldsync_domain::{Notification, Result};
use fieldsync_infra::observability::metrics::SyncMetricsSnapshot;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::context::AppContext;
use crate::utils::logging::log_command_execution;

/// Result of a user-initiated flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The backend did not answer its health probe; nothing was attempted.
    Offline,
    /// Another drain was running; this request became its follow-up pass.
    Coalesced,
    /// Another process owns the queue and replays it on its own schedule.
    OwnedElsewhere,
    Drained(DrainReport),
}

/// Re-queue failed entries and drain the whole queue, ignoring backoff.
pub async fn flush(ctx: &AppContext) -> Result<FlushOutcome> {
    let start = Instant::now();
    if !ctx.owns_queue() {
        info!("Queue owned by another process; flush left to it");
        log_command_execution("sync::flush", start.elapsed(), true);
        return Ok(FlushOutcome::OwnedElsewhere);
    }
    if !ctx.check_connectivity().await {
        warn!("Backend unreachable; flush skipped");
        log_command_execution("sync::flush", start.elapsed(), true);
        return Ok(FlushOutcome::Offline);
    }

    let outcome = match ctx.coordinator.flush().await {
        Some(report) => FlushOutcome::Drained(report),
        None => FlushOutcome::Coalesced,
    };
    log_command_execution("sync::flush", start.elapsed(), true);
    Ok(outcome)
}

/// Run the background sync runtime until `shutdown` resolves.
///
/// Every notification is handed to `on_notification` as it is emitted.
pub async fn run<S, F>(
    ctx: &mut AppContext,
    shutdown: S,
    mut on_notification: F,
) -> Result<SyncMetricsSnapshot>
where
    S: Future<Output = ()>,
    F: FnMut(&Notification),
{
    let start = Instant::now();
    let mut notifications = ctx.subscribe_notifications();
    let flush = ctx.start_sync().await?;

    // Whatever survived the last session is due now.
    flush.request();
    info!("Sync runtime running");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            received = notifications.recv() => match received {
                Ok(notification) => on_notification(&notification),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Notification consumer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let result = ctx.shutdown().await.map(|()| ctx.metrics.snapshot());
    log_command_execution("sync::run", start.elapsed(), result.is_ok());
    result
}
