//! Background sync worker.
//!
//! Turns connectivity events, a periodic backoff sweep and manual flush
//! requests into coordinator drains. Join handles are tracked, cancellation
//! is explicit and `stop` waits for the loop with a timeout.
//!
//! Each drain runs on its own task so the loop keeps receiving triggers
//! while a drain is in flight; the coordinator's gate folds those into a
//! single follow-up pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fieldsync_core::{ConnectivityMonitor, SyncCoordinator};
//! use fieldsync_infra::observability::metrics::SyncMetrics;
//! use fieldsync_infra::sync::{SyncWorker, SyncWorkerConfig};
//!
//! # async fn example(
//! #     coordinator: Arc<SyncCoordinator>,
//! #     monitor: ConnectivityMonitor,
//! #     online: tokio::sync::watch::Receiver<bool>,
//! # ) -> Result<(), String> {
//! let mut worker = SyncWorker::new(
//!     coordinator,
//!     monitor.subscribe(),
//!     online,
//!     SyncWorkerConfig::default(),
//!     Arc::new(SyncMetrics::new()),
//! );
//!
//! worker.start()?;
//! worker.flush_handle().request();
//! worker.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use fieldsync_core::{ConnectivityEvent, DrainTrigger, SyncCoordinator};
use fieldsync_domain::constants::DEFAULT_POLL_INTERVAL_SECS;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::observability::metrics::SyncMetrics;
use crate::observability::MetricsResult;

/// Configuration for the sync worker.
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    /// Interval of the backoff sweep
    pub poll_interval: Duration,
    /// Join timeout when stopping
    pub join_timeout: Duration,
}

impl Default for SyncWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Cloneable handle for requesting a manual flush from any task.
#[derive(Debug, Clone)]
pub struct FlushHandle {
    sender: mpsc::Sender<()>,
}

impl FlushHandle {
    /// Returns `false` only when the worker has gone away. A request made
    /// while another is still pending is merged into it.
    pub fn request(&self) -> bool {
        match self.sender.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => true,
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// Sync worker with explicit lifecycle management.
pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    events: broadcast::Receiver<ConnectivityEvent>,
    online: watch::Receiver<bool>,
    config: SyncWorkerConfig,
    flush_tx: mpsc::Sender<()>,
    flush_rx: Option<mpsc::Receiver<()>>,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<mpsc::Receiver<()>>>,
    metrics: Arc<SyncMetrics>,
}

impl SyncWorker {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        events: broadcast::Receiver<ConnectivityEvent>,
        online: watch::Receiver<bool>,
        config: SyncWorkerConfig,
        metrics: Arc<SyncMetrics>,
    ) -> Self {
        let (flush_tx, flush_rx) = mpsc::channel(1);
        Self {
            coordinator,
            events,
            online,
            config,
            flush_tx,
            flush_rx: Some(flush_rx),
            cancellation: CancellationToken::new(),
            task_handle: None,
            metrics,
        }
    }

    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle { sender: self.flush_tx.clone() }
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Start the worker, spawning the background loop.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }
        let flush_rx =
            self.flush_rx.take().ok_or_else(|| "Worker flush channel unavailable".to_string())?;

        info!(poll_interval_secs = self.config.poll_interval.as_secs(), "Starting sync worker");

        self.cancellation = CancellationToken::new();
        let ctx = LoopContext {
            coordinator: Arc::clone(&self.coordinator),
            events: self.events.resubscribe(),
            online: self.online.clone(),
            poll_interval: self.config.poll_interval,
            cancel: self.cancellation.clone(),
            metrics: Arc::clone(&self.metrics),
        };

        self.task_handle = Some(tokio::spawn(ctx.run(flush_rx)));
        Ok(())
    }

    /// Stop the worker and wait for the loop and any in-flight drain.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!("Stopping sync worker");
        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            match tokio::time::timeout(self.config.join_timeout, handle).await {
                Ok(Ok(flush_rx)) => {
                    self.flush_rx = Some(flush_rx);
                }
                Ok(Err(e)) => {
                    warn!("Worker task panicked: {}", e);
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!("Worker task did not complete within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        info!("Sync worker stopped");
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }
}

impl Drop for SyncWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("SyncWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}

struct LoopContext {
    coordinator: Arc<SyncCoordinator>,
    events: broadcast::Receiver<ConnectivityEvent>,
    online: watch::Receiver<bool>,
    poll_interval: Duration,
    cancel: CancellationToken,
    metrics: Arc<SyncMetrics>,
}

impl LoopContext {
    /// Hands the flush receiver back so the worker can be restarted.
    async fn run(mut self, mut flush_rx: mpsc::Receiver<()>) -> mpsc::Receiver<()> {
        let start = tokio::time::Instant::now() + self.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut drains = JoinSet::new();
        let mut events_open = true;

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    debug!("Sync worker loop cancelled");
                    break;
                }
                event = self.events.recv(), if events_open => match event {
                    Ok(ConnectivityEvent::Online) => {
                        log_metric(self.metrics.record_connectivity_event(), "sync_worker.online");
                        info!("Connectivity restored; draining queue");
                        self.spawn_drain(&mut drains, DrainTrigger::Online);
                    }
                    Ok(ConnectivityEvent::Offline) => {
                        log_metric(self.metrics.record_connectivity_event(), "sync_worker.offline");
                        info!("Connectivity lost");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed connectivity events");
                        if *self.online.borrow() {
                            self.spawn_drain(&mut drains, DrainTrigger::Online);
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("Connectivity stream closed");
                        events_open = false;
                    }
                },
                _ = ticker.tick() => {
                    if *self.online.borrow() {
                        self.spawn_drain(&mut drains, DrainTrigger::Poll);
                    } else {
                        debug!("Offline; skipping backoff sweep");
                    }
                }
                Some(()) = flush_rx.recv() => {
                    info!("Manual flush requested");
                    self.spawn_drain(&mut drains, DrainTrigger::Manual);
                }
                Some(joined) = drains.join_next(), if !drains.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Drain task failed");
                    }
                }
            }
        }

        // In-flight submissions are never aborted; stop's join timeout
        // bounds this wait.
        while let Some(joined) = drains.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Drain task failed");
            }
        }
        flush_rx
    }

    fn spawn_drain(&self, drains: &mut JoinSet<()>, trigger: DrainTrigger) {
        let coordinator = Arc::clone(&self.coordinator);
        let metrics = Arc::clone(&self.metrics);
        drains.spawn(async move {
            let started = Instant::now();
            match coordinator.trigger(trigger).await {
                Some(report) => {
                    log_metric(
                        metrics.record_drain(&report, started.elapsed()),
                        "sync_worker.drain",
                    );
                }
                None => log_metric(metrics.record_coalesced(), "sync_worker.coalesced"),
            }
        });
    }
}

fn log_metric(result: MetricsResult<()>, metric: &'static str) {
    if let Err(err) = result {
        warn!(metric = metric, error = ?err, "Failed to record worker metric");
    }
}
