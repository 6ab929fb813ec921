//! In-memory [`WriteStore`] with the same semantics as the SQLite store.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use fieldsync_domain::{
    FieldSyncError, NewWrite, PendingWrite, QueueSummary, Result, WriteFilter, WritePatch,
    WriteStatus,
};
use tokio::sync::Mutex;

use crate::sync::ports::WriteStore;

/// Vector-backed store; insertion order is enqueue order.
#[derive(Debug, Default)]
pub struct InMemoryWriteStore {
    entries: Mutex<Vec<PendingWrite>>,
    failing: AtomicBool,
}

impl InMemoryWriteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Insert a fully formed record, bypassing `enqueue`.
    pub async fn insert_raw(&self, write: PendingWrite) {
        self.entries.lock().await.push(write);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FieldSyncError::Storage("simulated storage failure".to_string()));
        }
        Ok(())
    }
}

fn not_found(id: &str) -> FieldSyncError {
    FieldSyncError::NotFound(format!("pending write {id}"))
}

#[async_trait]
impl WriteStore for InMemoryWriteStore {
    async fn enqueue(&self, write: NewWrite) -> Result<String> {
        self.check()?;
        let id = PendingWrite::generate_id();
        let record = PendingWrite::from_new(id.clone(), write, Utc::now());
        self.entries.lock().await.push(record);
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<PendingWrite>> {
        self.check()?;
        Ok(self.entries.lock().await.iter().find(|w| w.id == id).cloned())
    }

    async fn list(&self, filter: &WriteFilter) -> Result<Vec<PendingWrite>> {
        self.check()?;
        Ok(self.entries.lock().await.iter().filter(|w| filter.matches(w)).cloned().collect())
    }

    async fn update(&self, id: &str, patch: WritePatch) -> Result<Option<PendingWrite>> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|w| w.id == id).ok_or_else(|| not_found(id))?;

        let mut updated = entries[index].clone();
        updated.apply_patch(&patch)?;
        if updated.status == WriteStatus::Resolved {
            entries.remove(index);
            return Ok(None);
        }
        entries[index] = updated.clone();
        Ok(Some(updated))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|w| w.id == id).ok_or_else(|| not_found(id))?;
        entries.remove(index);
        Ok(())
    }

    async fn recover_interrupted(&self) -> Result<usize> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        let mut recovered = 0;
        for write in entries.iter_mut().filter(|w| w.status == WriteStatus::Submitting) {
            let attempts = write.attempt_count.saturating_add(1);
            write.apply_patch(&WritePatch::requeue(attempts))?;
            recovered += 1;
        }
        Ok(recovered)
    }

    async fn dismiss(&self, id: &str) -> Result<()> {
        self.check()?;
        let mut entries = self.entries.lock().await;
        let index = entries.iter().position(|w| w.id == id).ok_or_else(|| not_found(id))?;
        if entries[index].status != WriteStatus::Failed {
            return Err(FieldSyncError::InvalidTransition(format!(
                "only failed writes can be dismissed; {id} is {}",
                entries[index].status
            )));
        }
        entries.remove(index);
        Ok(())
    }

    async fn summary(&self) -> Result<QueueSummary> {
        self.check()?;
        Ok(QueueSummary::from_writes(self.entries.lock().await.iter()))
    }
}
