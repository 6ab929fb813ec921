//! Sync coordinator: drains the durable store once connectivity returns.
//!
//! Drains are serialized by [`DrainGate`]. Modules drain concurrently while
//! entries within one module are replayed strictly in enqueue order; a
//! transient failure or an entry still inside its backoff window stops its
//! module for the rest of the pass.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use fieldsync_common::sync::retry::RetryPolicy;
use fieldsync_common::time::Clock;
use fieldsync_domain::{PendingWrite, Result, WriteFilter, WritePatch, WriteStatus};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::sync::delivery::deliver;
use crate::sync::errors::ReplayError;
use crate::sync::notifications::NotificationEmitter;
use crate::sync::operations::OperationRegistry;
use crate::sync::ports::{WriteRequest, WriteStore, WriteTransport};
use crate::sync::resolver::{ConflictResolver, Resolution, ResolutionPolicy};

/// Why a drain was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainTrigger {
    /// Connectivity monitor reported a stable reconnect.
    Online,
    /// User asked to sync now; ignores backoff and retries failed entries.
    Manual,
    /// Periodic sweep for entries whose backoff window has elapsed.
    Poll,
}

impl DrainTrigger {
    fn merge(self, other: Self) -> Self {
        if self == Self::Manual || other == Self::Manual {
            Self::Manual
        } else {
            other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Draining { follow_up: Option<DrainTrigger> },
}

/// Result of asking the gate for a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEntry {
    /// The caller owns the drain and must call [`DrainGate::finish`].
    Begin,
    /// A drain is running; a single follow-up has been scheduled.
    Coalesced,
}

/// Two-state machine enforcing one drain at a time.
///
/// Triggers arriving while draining collapse into at most one follow-up.
#[derive(Debug)]
pub struct DrainGate {
    state: Mutex<GateState>,
}

impl Default for DrainGate {
    fn default() -> Self {
        Self { state: Mutex::new(GateState::Idle) }
    }
}

impl DrainGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_begin(&self, trigger: DrainTrigger) -> GateEntry {
        let mut state = self.lock();
        match *state {
            GateState::Idle => {
                *state = GateState::Draining { follow_up: None };
                GateEntry::Begin
            }
            GateState::Draining { follow_up } => {
                let merged = follow_up.map_or(trigger, |pending| pending.merge(trigger));
                *state = GateState::Draining { follow_up: Some(merged) };
                GateEntry::Coalesced
            }
        }
    }

    /// End the current pass.
    ///
    /// Returns the follow-up trigger if one was scheduled; the gate then stays
    /// draining and the caller runs one more pass.
    pub fn finish(&self) -> Option<DrainTrigger> {
        let mut state = self.lock();
        match *state {
            GateState::Draining { follow_up: Some(next) } => {
                *state = GateState::Draining { follow_up: None };
                Some(next)
            }
            _ => {
                *state = GateState::Idle;
                None
            }
        }
    }

    pub fn is_draining(&self) -> bool {
        matches!(*self.lock(), GateState::Draining { .. })
    }

    pub fn has_follow_up(&self) -> bool {
        matches!(*self.lock(), GateState::Draining { follow_up: Some(_) })
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts for one or more drain passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub passes: u32,
    /// Delivered and removed.
    pub resolved: usize,
    /// Conflicts settled by the resolver (removed or failed).
    pub conflicts: usize,
    /// Transient failures sent back to the queue.
    pub retried: usize,
    /// Entries that became `failed` in this drain.
    pub failed: usize,
    /// Entries not attempted because their module was blocked.
    pub skipped: usize,
    /// `failed` entries re-queued by a manual flush.
    pub requeued: usize,
    /// Store errors that aborted a module pass.
    pub store_errors: usize,
}

impl DrainReport {
    fn merge(&mut self, other: &Self) {
        self.passes += other.passes;
        self.resolved += other.resolved;
        self.conflicts += other.conflicts;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.requeued += other.requeued;
        self.store_errors += other.store_errors;
    }

    pub fn attempted(&self) -> usize {
        self.resolved + self.conflicts + self.retried + self.failed
    }
}

enum Step {
    Continue,
    Halt,
}

pub struct SyncCoordinator {
    store: Arc<dyn WriteStore>,
    transport: Arc<dyn WriteTransport>,
    registry: Arc<OperationRegistry>,
    emitter: Arc<NotificationEmitter>,
    resolver: ConflictResolver,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    request_timeout: Duration,
    gate: DrainGate,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn WriteStore>,
        transport: Arc<dyn WriteTransport>,
        registry: Arc<OperationRegistry>,
        emitter: Arc<NotificationEmitter>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let resolver = ConflictResolver::new(Arc::clone(&store), Arc::clone(&emitter));
        Self {
            store,
            transport,
            registry,
            emitter,
            resolver,
            policy,
            clock,
            request_timeout: Duration::from_secs(
                fieldsync_domain::constants::DEFAULT_REQUEST_TIMEOUT_SECS,
            ),
            gate: DrainGate::new(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_resolution_policy(mut self, policy: ResolutionPolicy) -> Self {
        let store = Arc::clone(&self.store);
        self.resolver = ConflictResolver::with_policy(store, Arc::clone(&self.emitter), policy);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn is_draining(&self) -> bool {
        self.gate.is_draining()
    }

    /// User-initiated sync.
    pub async fn flush(&self) -> Option<DrainReport> {
        self.trigger(DrainTrigger::Manual).await
    }

    /// Request a drain.
    ///
    /// Returns `None` when a drain is already running; the request is then
    /// folded into that drain's single follow-up pass.
    #[instrument(skip(self))]
    pub async fn trigger(&self, trigger: DrainTrigger) -> Option<DrainReport> {
        if self.gate.try_begin(trigger) == GateEntry::Coalesced {
            debug!("Drain in progress; scheduled follow-up");
            return None;
        }

        let mut report = DrainReport::default();
        let mut current = trigger;
        loop {
            let pass = self.drain_pass(current).await;
            report.merge(&pass);
            match self.gate.finish() {
                Some(next) => {
                    debug!(?next, "Running follow-up drain");
                    current = next;
                }
                None => break,
            }
        }

        info!(
            passes = report.passes,
            resolved = report.resolved,
            conflicts = report.conflicts,
            retried = report.retried,
            failed = report.failed,
            skipped = report.skipped,
            "Drain complete"
        );
        Some(report)
    }

    async fn drain_pass(&self, trigger: DrainTrigger) -> DrainReport {
        let mut report = DrainReport { passes: 1, ..DrainReport::default() };

        if trigger == DrainTrigger::Manual {
            match self.requeue_failed().await {
                Ok(count) => report.requeued = count,
                Err(err) => {
                    self.report_store_error("re-queue failed writes", &err.to_string());
                    report.store_errors += 1;
                }
            }
        }

        let mut filter = WriteFilter::all().with_status(WriteStatus::Queued);
        if self.holds_module() {
            filter = filter.with_status(WriteStatus::Failed);
        }
        let queued = match self.store.list(&filter).await {
            Ok(queued) => queued,
            Err(err) => {
                self.report_store_error("list pending writes", &err.to_string());
                report.store_errors += 1;
                return report;
            }
        };

        if queued.is_empty() {
            return report;
        }

        let ignore_backoff = trigger == DrainTrigger::Manual;
        let passes = group_by_module(queued)
            .into_iter()
            .map(|(module, writes)| self.drain_module(module, writes, ignore_backoff));
        for module_report in join_all(passes).await {
            report.merge(&DrainReport { passes: 0, ..module_report });
        }
        report
    }

    async fn requeue_failed(&self) -> Result<usize> {
        let failed = self.store.list(&WriteFilter::all().with_status(WriteStatus::Failed)).await?;
        for write in &failed {
            self.store.update(&write.id, WritePatch::requeue(0)).await?;
        }
        if !failed.is_empty() {
            info!(count = failed.len(), "Re-queued failed writes for manual flush");
        }
        Ok(failed.len())
    }

    #[instrument(skip(self, writes), fields(entries = writes.len()))]
    async fn drain_module(
        &self,
        module: String,
        writes: Vec<PendingWrite>,
        ignore_backoff: bool,
    ) -> DrainReport {
        let mut report = DrainReport::default();
        let total = writes.len();

        for (index, write) in writes.into_iter().enumerate() {
            if write.status == WriteStatus::Failed {
                debug!(write_id = %write.id, "Module held behind failed entry");
                report.skipped += total - index - 1;
                break;
            }

            let now = self.clock.utc_now();
            if !ignore_backoff
                && !self.policy.is_eligible(
                    &write.id,
                    write.last_attempt_at,
                    write.attempt_count,
                    now,
                )
            {
                debug!(write_id = %write.id, attempts = write.attempt_count, "Backoff window open");
                report.skipped += total - index;
                break;
            }

            match self.replay(write, &mut report).await {
                Ok(Step::Continue) => {}
                Ok(Step::Halt) => {
                    report.skipped += total - index - 1;
                    break;
                }
                Err(err) => {
                    self.report_store_error("update pending write", &err.to_string());
                    report.store_errors += 1;
                    report.skipped += total - index - 1;
                    break;
                }
            }
        }
        report
    }

    async fn replay(&self, write: PendingWrite, report: &mut DrainReport) -> Result<Step> {
        let Some(write) =
            self.store.update(&write.id, WritePatch::submitting(self.clock.utc_now())).await?
        else {
            return Ok(Step::Continue);
        };

        let request = WriteRequest {
            method: self.registry.method_for(&write.operation_type).to_string(),
            endpoint: write.endpoint.clone(),
            payload: write.payload.clone(),
            idempotency_key: Some(write.id.clone()),
        };

        let failure = match deliver(self.transport.as_ref(), &request, self.request_timeout).await
        {
            Ok(response) => {
                self.store.update(&write.id, WritePatch::resolved()).await?;
                self.emitter.synced(&write);
                debug!(write_id = %write.id, status = response.status, "Write delivered");
                report.resolved += 1;
                return Ok(Step::Continue);
            }
            Err(err) => err,
        };

        match failure {
            ReplayError::Conflict { kind, ref info, .. } => {
                match self.resolver.resolve(&write, kind, info).await? {
                    Resolution::Resolved => {
                        report.conflicts += 1;
                        Ok(Step::Continue)
                    }
                    Resolution::Failed => {
                        report.conflicts += 1;
                        report.failed += 1;
                        Ok(self.after_failure())
                    }
                    Resolution::Deferred => self.retry_later(&write, &failure, report).await,
                }
            }
            ReplayError::Validation { ref message, status } => {
                warn!(write_id = %write.id, status, "Replay rejected; marking failed");
                self.store.update(&write.id, WritePatch::failed(message)).await?;
                self.emitter.replay_rejected(&write, message);
                report.failed += 1;
                Ok(self.after_failure())
            }
            transient => self.retry_later(&write, &transient, report).await,
        }
    }

    /// Transient path: count the attempt and either requeue or give up.
    async fn retry_later(
        &self,
        write: &PendingWrite,
        failure: &ReplayError,
        report: &mut DrainReport,
    ) -> Result<Step> {
        let attempts = write.attempt_count.saturating_add(1);

        if self.policy.is_exhausted(attempts) {
            warn!(
                write_id = %write.id,
                attempts,
                error = %failure,
                "Retries exhausted; marking failed"
            );
            let patch = WritePatch::failed(&failure.reason()).with_attempt_count(attempts);
            self.store.update(&write.id, patch).await?;
            self.emitter.retries_exhausted(write, attempts);
            report.failed += 1;
            return Ok(self.after_failure());
        }

        debug!(write_id = %write.id, attempts, error = %failure, "Transient failure; requeued");
        self.store.update(&write.id, WritePatch::requeue(attempts)).await?;
        report.retried += 1;
        Ok(Step::Halt)
    }

    fn holds_module(&self) -> bool {
        self.resolver.policy().holds_module_on_failure()
    }

    /// Whether later entries of the module may follow an entry that just failed.
    fn after_failure(&self) -> Step {
        if self.holds_module() {
            Step::Halt
        } else {
            Step::Continue
        }
    }

    fn report_store_error(&self, action: &str, error: &str) {
        error!(action, error, "Write store failure during drain");
        self.emitter.storage_failure(&format!("Could not {action}"), error);
    }
}

/// Group entries by module, keeping enqueue order within and across groups.
fn group_by_module(writes: Vec<PendingWrite>) -> Vec<(String, Vec<PendingWrite>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<PendingWrite>)> = Vec::new();
    for write in writes {
        match index.get(&write.module) {
            Some(&slot) => groups[slot].1.push(write),
            None => {
                index.insert(write.module.clone(), groups.len());
                groups.push((write.module.clone(), vec![write]));
            }
        }
    }
    groups
}
