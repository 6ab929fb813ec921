//! Conflict resolution policy.

use std::sync::Arc;

use fieldsync_domain::{ConflictInfo, ConflictKind, PendingWrite, Result, WritePatch};
use tracing::{info, instrument, warn};

use crate::sync::notifications::NotificationEmitter;
use crate::sync::ports::WriteStore;

/// What the policy does with an entry for a given conflict kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionAction {
    /// Remove the entry; the server state already reflects or supersedes it.
    Resolve,
    /// Mark the entry failed and keep it until dismissed.
    Fail,
    /// Leave the entry to the transient retry path.
    Defer,
}

/// Terminal state the resolver left the entry in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Resolved,
    Failed,
    Deferred,
}

/// One rule per conflict kind. Version conflicts resolve server-wins.
///
/// `hold_module_on_failure` decides what a `failed` entry means for the
/// entries queued behind it in the same module. Off (the default), later
/// entries keep draining. On, the module stops at the failed entry until it
/// is dismissed or re-queued by a manual flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPolicy {
    duplicate: ResolutionAction,
    version: ResolutionAction,
    deleted: ResolutionAction,
    unauthorized: ResolutionAction,
    hold_module_on_failure: bool,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            duplicate: ResolutionAction::Resolve,
            version: ResolutionAction::Resolve,
            deleted: ResolutionAction::Fail,
            unauthorized: ResolutionAction::Fail,
            hold_module_on_failure: false,
        }
    }
}

impl ResolutionPolicy {
    pub fn action_for(&self, kind: ConflictKind) -> ResolutionAction {
        match kind {
            ConflictKind::Duplicate => self.duplicate,
            ConflictKind::Version => self.version,
            ConflictKind::Deleted => self.deleted,
            ConflictKind::Unauthorized => self.unauthorized,
            ConflictKind::Unknown => ResolutionAction::Defer,
        }
    }

    #[must_use]
    pub fn with_module_hold(mut self, hold: bool) -> Self {
        self.hold_module_on_failure = hold;
        self
    }

    pub fn holds_module_on_failure(&self) -> bool {
        self.hold_module_on_failure
    }
}

pub struct ConflictResolver {
    store: Arc<dyn WriteStore>,
    emitter: Arc<NotificationEmitter>,
    policy: ResolutionPolicy,
}

impl ConflictResolver {
    pub fn new(store: Arc<dyn WriteStore>, emitter: Arc<NotificationEmitter>) -> Self {
        Self::with_policy(store, emitter, ResolutionPolicy::default())
    }

    pub fn with_policy(
        store: Arc<dyn WriteStore>,
        emitter: Arc<NotificationEmitter>,
        policy: ResolutionPolicy,
    ) -> Self {
        Self { store, emitter, policy }
    }

    pub fn policy(&self) -> &ResolutionPolicy {
        &self.policy
    }

    /// Apply the policy to a queued entry and notify the user.
    ///
    /// Store failures propagate; the entry is then left as it was.
    #[instrument(skip(self, write, conflict), fields(write_id = %write.id, module = %write.module))]
    pub async fn resolve(
        &self,
        write: &PendingWrite,
        kind: ConflictKind,
        conflict: &ConflictInfo,
    ) -> Result<Resolution> {
        match self.policy.action_for(kind) {
            ResolutionAction::Resolve => {
                self.store.update(&write.id, WritePatch::resolved()).await?;
                self.emitter.forget(&write.id);
                self.emitter.conflict(write.into(), kind, conflict);
                info!(%kind, "Conflict resolved; entry removed");
                Ok(Resolution::Resolved)
            }
            ResolutionAction::Fail => {
                let reason = failure_reason(kind, conflict);
                self.store.update(&write.id, WritePatch::failed(&reason)).await?;
                self.emitter.forget(&write.id);
                self.emitter.conflict(write.into(), kind, conflict);
                warn!(%kind, reason = %reason, "Conflict is terminal; entry marked failed");
                Ok(Resolution::Failed)
            }
            ResolutionAction::Defer => Ok(Resolution::Deferred),
        }
    }
}

fn failure_reason(kind: ConflictKind, conflict: &ConflictInfo) -> String {
    let base = match kind {
        ConflictKind::Deleted => "Target record was deleted on the server",
        ConflictKind::Unauthorized => "Not permitted; elevated access required",
        _ => "Rejected by the server",
    };
    match &conflict.message {
        Some(message) => format!("{base}: {message}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use fieldsync_domain::{NewWrite, NotificationLevel, WriteFilter, WriteStatus};
    use serde_json::json;

    use super::*;
    use crate::sync::memory::InMemoryWriteStore;
    use crate::sync::testing::RecordingSink;

    struct Fixture {
        store: Arc<InMemoryWriteStore>,
        sink: Arc<RecordingSink>,
        resolver: ConflictResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryWriteStore::new());
        let sink = Arc::new(RecordingSink::new());
        let emitter = Arc::new(NotificationEmitter::new(sink.clone()));
        let resolver = ConflictResolver::new(store.clone(), emitter);
        Fixture { store, sink, resolver }
    }

    async fn queued(store: &InMemoryWriteStore) -> PendingWrite {
        let id = store
            .enqueue(NewWrite::new("complete_task", "/api/tasks/complete", "tasks", json!({})))
            .await
            .unwrap();
        store.get(&id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn duplicate_and_version_resolve() {
        let f = fixture();
        for kind in [ConflictKind::Duplicate, ConflictKind::Version] {
            let write = queued(&f.store).await;
            let outcome = f.resolver.resolve(&write, kind, &ConflictInfo::default()).await;
            assert_eq!(outcome.unwrap(), Resolution::Resolved);
            assert_eq!(f.store.get(&write.id).await.unwrap(), None);
        }
        assert_eq!(f.sink.count_at(NotificationLevel::Error), 0);
    }

    #[tokio::test]
    async fn deleted_and_unauthorized_fail_and_persist() {
        let f = fixture();
        for kind in [ConflictKind::Deleted, ConflictKind::Unauthorized] {
            let write = queued(&f.store).await;
            let outcome = f.resolver.resolve(&write, kind, &ConflictInfo::default()).await;
            assert_eq!(outcome.unwrap(), Resolution::Failed);

            let stored = f.store.get(&write.id).await.unwrap().unwrap();
            assert_eq!(stored.status, WriteStatus::Failed);
            assert!(stored.error.is_some());
        }
        assert_eq!(f.sink.count_at(NotificationLevel::Error), 2);
    }

    #[tokio::test]
    async fn unknown_defers_without_touching_store() {
        let f = fixture();
        let write = queued(&f.store).await;
        let info = ConflictInfo::default();
        let outcome = f.resolver.resolve(&write, ConflictKind::Unknown, &info).await;
        assert_eq!(outcome.unwrap(), Resolution::Deferred);

        let all = f.store.list(&WriteFilter::all()).await.unwrap();
        assert_eq!(all, vec![write]);
        assert!(f.sink.notifications().is_empty());
    }

    #[test]
    fn policy_table() {
        let policy = ResolutionPolicy::default();
        assert_eq!(policy.action_for(ConflictKind::Duplicate), ResolutionAction::Resolve);
        assert_eq!(policy.action_for(ConflictKind::Version), ResolutionAction::Resolve);
        assert_eq!(policy.action_for(ConflictKind::Deleted), ResolutionAction::Fail);
        assert_eq!(policy.action_for(ConflictKind::Unauthorized), ResolutionAction::Fail);
        assert_eq!(policy.action_for(ConflictKind::Unknown), ResolutionAction::Defer);
        assert!(!policy.holds_module_on_failure());
        assert!(policy.with_module_hold(true).holds_module_on_failure());
    }
}
