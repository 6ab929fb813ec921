//! Drain counters for the sync worker.
//!
//! ## Design
//! - **No locking** - plain atomic counters, `Relaxed` for independent
//!   counters and `SeqCst` for the pair used in the average drain time
//! - **MetricsResult returns** for future extensibility (currently always Ok)

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use fieldsync_core::DrainReport;
use serde::Serialize;

use crate::observability::MetricsResult;

#[derive(Debug, Default)]
pub struct SyncMetrics {
    drains: AtomicUsize,
    passes: AtomicUsize,
    resolved: AtomicUsize,
    conflicts: AtomicUsize,
    retried: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    store_errors: AtomicUsize,
    coalesced_triggers: AtomicUsize,
    connectivity_events: AtomicUsize,
    total_drain_time_micros: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetricsSnapshot {
    pub drains: usize,
    pub passes: usize,
    pub resolved: usize,
    pub conflicts: usize,
    pub retried: usize,
    pub failed: usize,
    pub skipped: usize,
    pub store_errors: usize,
    pub coalesced_triggers: usize,
    pub connectivity_events: usize,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed drain and how long it took.
    pub fn record_drain(&self, report: &DrainReport, elapsed: Duration) -> MetricsResult<()> {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);

        // SeqCst for consistency with avg_drain_time_ms
        self.total_drain_time_micros.fetch_add(micros, Ordering::SeqCst);
        self.drains.fetch_add(1, Ordering::SeqCst);

        self.passes.fetch_add(report.passes as usize, Ordering::Relaxed);
        self.resolved.fetch_add(report.resolved, Ordering::Relaxed);
        self.conflicts.fetch_add(report.conflicts, Ordering::Relaxed);
        self.retried.fetch_add(report.retried, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped, Ordering::Relaxed);
        self.store_errors.fetch_add(report.store_errors, Ordering::Relaxed);
        Ok(())
    }

    /// A trigger folded into an already running drain.
    pub fn record_coalesced(&self) -> MetricsResult<()> {
        self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_connectivity_event(&self) -> MetricsResult<()> {
        self.connectivity_events.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Average drain duration in milliseconds; 0.0 before the first drain.
    pub fn avg_drain_time_ms(&self) -> f64 {
        let total = self.total_drain_time_micros.load(Ordering::SeqCst);
        let count = self.drains.load(Ordering::SeqCst);
        if count == 0 {
            return 0.0;
        }
        (total as f64 / count as f64) / 1_000.0
    }

    pub fn snapshot(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            drains: self.drains.load(Ordering::SeqCst),
            passes: self.passes.load(Ordering::Relaxed),
            resolved: self.resolved.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            coalesced_triggers: self.coalesced_triggers.load(Ordering::Relaxed),
            connectivity_events: self.connectivity_events.load(Ordering::Relaxed),
        }
    }
}
