//! SQLite-backed implementation of the durable write store.
//!
//! Mutations are serialized through one async lock so that concurrent
//! callers cannot interleave read-modify-write cycles; the SQLite work itself
//! runs on the blocking pool. Reads skip the lock and rely on WAL snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use fieldsync_core::WriteStore;
use fieldsync_domain::{
    FieldSyncError, NewWrite, PendingWrite, QueueSummary, Result, WriteFilter, WritePatch,
    WriteStatus,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row, Transaction};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, instrument, warn};

use super::manager::{map_sql_error, DbManager};
use super::pool::SqliteConnection;

const SELECT_COLUMNS: &str = "id, operation_type, endpoint, module, payload, status, \
     attempt_count, created_at, last_attempt_at, error";

/// SQLite-backed [`WriteStore`].
pub struct SqlitePendingWriteStore {
    db: Arc<DbManager>,
    write_lock: Mutex<()>,
}

impl SqlitePendingWriteStore {
    /// Construct a store backed by the shared manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db, write_lock: Mutex::new(()) }
    }

    /// Run `op` on a pooled connection on the blocking pool.
    async fn with_connection<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || {
            let mut conn = db.get_connection()?;
            op(&mut conn)
        })
        .await
        .map_err(map_join_error)?
    }

    /// Same as [`Self::with_connection`] but holding the write lock and
    /// inside an immediate transaction.
    async fn with_transaction<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Transaction<'_>) -> Result<T> + Send + 'static,
    {
        let _guard = self.write_lock.lock().await;
        self.with_connection(move |conn| {
            let tx = conn
                .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
                .map_err(map_sql_error)?;
            let value = op(&tx)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(value)
        })
        .await
    }
}

#[async_trait]
impl WriteStore for SqlitePendingWriteStore {
    #[instrument(skip(self, write), fields(module = %write.module))]
    async fn enqueue(&self, write: NewWrite) -> Result<String> {
        let record = PendingWrite::from_new(PendingWrite::generate_id(), write, Utc::now());
        let id = record.id.clone();

        self.with_transaction(move |tx| insert_write(tx, &record)).await?;
        debug!(write_id = %id, "Write persisted");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<PendingWrite>> {
        let id = id.to_string();
        self.with_connection(move |conn| fetch_by_id(conn, &id)).await
    }

    async fn list(&self, filter: &WriteFilter) -> Result<Vec<PendingWrite>> {
        let filter = filter.clone();
        self.with_connection(move |conn| fetch_filtered(conn, &filter)).await
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, id: &str, patch: WritePatch) -> Result<Option<PendingWrite>> {
        let id = id.to_string();
        self.with_transaction(move |tx| {
            let mut write = fetch_by_id(tx, &id)?.ok_or_else(|| not_found(&id))?;
            write.apply_patch(&patch)?;

            if write.status == WriteStatus::Resolved {
                tx.execute("DELETE FROM pending_writes WHERE id = ?1", params![id])
                    .map_err(map_sql_error)?;
                return Ok(None);
            }

            tx.execute(
                "UPDATE pending_writes
                 SET status = ?2, attempt_count = ?3, last_attempt_at = ?4, error = ?5
                 WHERE id = ?1",
                params![
                    write.id,
                    write.status.to_string(),
                    write.attempt_count,
                    write.last_attempt_at.map(format_timestamp),
                    write.error,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(Some(write))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_transaction(move |tx| {
            let removed = tx
                .execute("DELETE FROM pending_writes WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            if removed == 0 {
                return Err(not_found(&id));
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn recover_interrupted(&self) -> Result<usize> {
        let recovered = self
            .with_transaction(|tx| {
                tx.execute(
                    "UPDATE pending_writes
                     SET status = 'queued', attempt_count = attempt_count + 1, error = NULL
                     WHERE status = 'submitting'",
                    [],
                )
                .map_err(map_sql_error)
            })
            .await?;

        if recovered > 0 {
            warn!(recovered, "Re-queued writes interrupted mid-submission");
        }
        Ok(recovered)
    }

    #[instrument(skip(self))]
    async fn dismiss(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_transaction(move |tx| {
            let write = fetch_by_id(tx, &id)?.ok_or_else(|| not_found(&id))?;
            if write.status != WriteStatus::Failed {
                return Err(FieldSyncError::InvalidTransition(format!(
                    "only failed writes can be dismissed; {id} is {}",
                    write.status
                )));
            }
            tx.execute("DELETE FROM pending_writes WHERE id = ?1", params![id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn summary(&self) -> Result<QueueSummary> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT status, COUNT(*), MIN(created_at) FROM pending_writes GROUP BY status",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
                })
                .map_err(map_sql_error)?;

            let mut summary = QueueSummary::default();
            for row in rows {
                let (status, count, oldest) = row.map_err(map_sql_error)?;
                let count = usize::try_from(count).unwrap_or_default();
                match parse_status(&status) {
                    WriteStatus::Queued => summary.queued += count,
                    WriteStatus::Submitting => summary.submitting += count,
                    WriteStatus::Failed => summary.failed += count,
                    WriteStatus::Resolved => continue,
                }
                let oldest = parse_timestamp(&oldest)
                    .map_err(|err| FieldSyncError::Storage(format!("invalid created_at: {err}")))?;
                summary.oldest_created_at = Some(match summary.oldest_created_at {
                    Some(current) if current <= oldest => current,
                    _ => oldest,
                });
            }
            Ok(summary)
        })
        .await
    }
}

fn insert_write(conn: &rusqlite::Connection, write: &PendingWrite) -> Result<()> {
    let payload = serde_json::to_string(&write.payload)
        .map_err(|err| FieldSyncError::Storage(format!("payload is not serializable: {err}")))?;

    conn.execute(
        "INSERT INTO pending_writes (
            id, operation_type, endpoint, module, payload, status,
            attempt_count, created_at, last_attempt_at, error
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            write.id,
            write.operation_type,
            write.endpoint,
            write.module,
            payload,
            write.status.to_string(),
            write.attempt_count,
            format_timestamp(write.created_at),
            write.last_attempt_at.map(format_timestamp),
            write.error,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn fetch_by_id(conn: &rusqlite::Connection, id: &str) -> Result<Option<PendingWrite>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM pending_writes WHERE id = ?1"),
        params![id],
        map_write_row,
    )
    .optional()
    .map_err(map_sql_error)
}

fn fetch_filtered(conn: &rusqlite::Connection, filter: &WriteFilter) -> Result<Vec<PendingWrite>> {
    let mut clauses = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(statuses) = &filter.statuses {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        clauses.push(format!("status IN ({placeholders})"));
        values.extend(statuses.iter().map(ToString::to_string));
    }
    if let Some(module) = &filter.module {
        clauses.push("module = ?".to_string());
        values.push(module.clone());
    }

    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM pending_writes");
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY seq ASC");

    let mut stmt = conn.prepare(&sql).map_err(map_sql_error)?;
    let rows =
        stmt.query_map(params_from_iter(values.iter()), map_write_row).map_err(map_sql_error)?;
    let writes = rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?;
    Ok(writes)
}

fn map_write_row(row: &Row<'_>) -> rusqlite::Result<PendingWrite> {
    let payload_raw: String = row.get(4)?;
    let payload = serde_json::from_str(&payload_raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(err)))?;

    let status_raw: String = row.get(5)?;
    let created_raw: String = row.get(7)?;
    let last_attempt_raw: Option<String> = row.get(8)?;

    Ok(PendingWrite {
        id: row.get(0)?,
        operation_type: row.get(1)?,
        endpoint: row.get(2)?,
        module: row.get(3)?,
        payload,
        status: parse_status(&status_raw),
        attempt_count: row.get(6)?,
        created_at: parse_timestamp(&created_raw).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(err))
        })?,
        last_attempt_at: last_attempt_raw
            .as_deref()
            .map(parse_timestamp)
            .transpose()
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(err))
            })?,
        error: row.get(9)?,
    })
}

fn parse_status(raw: &str) -> WriteStatus {
    match raw.parse::<WriteStatus>() {
        Ok(status) => status,
        Err(err) => {
            warn!(
                raw_status = %raw,
                error = %err,
                "invalid pending write status in database; treating as queued"
            );
            WriteStatus::Queued
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|at| at.with_timezone(&Utc))
}

fn not_found(id: &str) -> FieldSyncError {
    FieldSyncError::NotFound(format!("pending write {id}"))
}

fn map_join_error(err: task::JoinError) -> FieldSyncError {
    FieldSyncError::Storage(format!("storage task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn open(dir: &TempDir) -> SqlitePendingWriteStore {
        let db = DbManager::open(dir.path().join("queue.db"), 2).unwrap();
        SqlitePendingWriteStore::new(Arc::new(db))
    }

    fn write(module: &str, items: u32) -> NewWrite {
        NewWrite::new(
            "submit_stock_count",
            "/api/stock-counts",
            module,
            json!({"lines": [{"sku": "A-1", "qty": items}]}),
        )
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let before = {
            let store = open(&dir);
            store.enqueue(write("inventory", 5)).await.unwrap();
            let failed = store.enqueue(write("waste", 1)).await.unwrap();
            store.update(&failed, WritePatch::failed("HTTP 410")).await.unwrap();
            store.list(&WriteFilter::all()).await.unwrap()
        };

        let store = open(&dir);
        let after = store.list(&WriteFilter::all()).await.unwrap();
        assert_eq!(before, after);
        assert_eq!(after[1].status, WriteStatus::Failed);
        assert_eq!(after[1].error.as_deref(), Some("HTTP 410"));
    }

    #[tokio::test]
    async fn list_filters_and_keeps_enqueue_order() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let a = store.enqueue(write("inventory", 1)).await.unwrap();
        let b = store.enqueue(write("waste", 2)).await.unwrap();
        let c = store.enqueue(write("inventory", 3)).await.unwrap();
        store.update(&b, WritePatch::failed("boom")).await.unwrap();

        let inventory = store.list(&WriteFilter::all().in_module("inventory")).await.unwrap();
        let ids: Vec<_> = inventory.iter().map(|w| w.id.as_str()).collect();
        assert_eq!(ids, vec![a.as_str(), c.as_str()]);

        let queued = WriteFilter::all().with_status(WriteStatus::Queued);
        assert_eq!(store.list(&queued).await.unwrap().len(), 2);
        let failed = WriteFilter::all().with_status(WriteStatus::Failed);
        let failed = store.list(&failed).await.unwrap();
        assert_eq!(failed[0].id, b);
    }

    #[tokio::test]
    async fn resolved_update_deletes_row() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(write("inventory", 1)).await.unwrap();

        assert_eq!(store.update(&id, WritePatch::resolved()).await.unwrap(), None);
        assert_eq!(store.get(&id).await.unwrap(), None);
        assert!(matches!(
            store.update(&id, WritePatch::requeue(1)).await,
            Err(FieldSyncError::NotFound(_))
        ));
        assert!(matches!(store.remove(&id).await, Err(FieldSyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn submitting_twice_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(write("inventory", 1)).await.unwrap();

        store.update(&id, WritePatch::submitting(Utc::now())).await.unwrap();
        assert!(matches!(
            store.update(&id, WritePatch::submitting(Utc::now())).await,
            Err(FieldSyncError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn recover_interrupted_requeues_and_counts_attempt() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            let id = store.enqueue(write("inventory", 1)).await.unwrap();
            store.update(&id, WritePatch::submitting(Utc::now())).await.unwrap();
        }

        let store = open(&dir);
        assert_eq!(store.recover_interrupted().await.unwrap(), 1);
        let entries = store.list(&WriteFilter::all()).await.unwrap();
        assert_eq!(entries[0].status, WriteStatus::Queued);
        assert_eq!(entries[0].attempt_count, 1);
        assert_eq!(store.recover_interrupted().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dismiss_only_removes_failed_entries() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = store.enqueue(write("inventory", 1)).await.unwrap();

        assert!(matches!(store.dismiss(&id).await, Err(FieldSyncError::InvalidTransition(_))));
        store.update(&id, WritePatch::failed("gone")).await.unwrap();
        store.dismiss(&id).await.unwrap();
        assert_eq!(store.get(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn summary_counts_by_status() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let first = store.enqueue(write("inventory", 1)).await.unwrap();
        store.enqueue(write("inventory", 2)).await.unwrap();
        let failed = store.enqueue(write("waste", 3)).await.unwrap();
        store.update(&failed, WritePatch::failed("x")).await.unwrap();

        let summary = store.summary().await.unwrap();
        assert_eq!((summary.queued, summary.submitting, summary.failed), (2, 0, 1));
        let oldest = store.get(&first).await.unwrap().unwrap().created_at;
        assert_eq!(summary.oldest_created_at, Some(oldest));
    }

    #[tokio::test]
    async fn concurrent_enqueues_are_all_persisted() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(open(&dir));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.enqueue(write("inventory", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.list(&WriteFilter::all()).await.unwrap().len(), 20);
    }

    #[test]
    fn timestamps_round_trip_with_full_precision() {
        let at = Utc::now() + ChronoDuration::nanoseconds(123);
        assert_eq!(parse_timestamp(&format_timestamp(at)).unwrap(), at);
    }
}
