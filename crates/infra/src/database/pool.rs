//! SQLite connection pool helpers.
//!
//! Every pooled connection is opened with the pragmas the write queue relies
//! on: WAL journaling for concurrent readers and `synchronous=FULL` so a
//! committed enqueue survives power loss.

use std::path::Path;
use std::time::Duration;

use fieldsync_domain::{FieldSyncError, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Pool of SQLite connections to the queue database.
pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Connection checked out of a [`SqlitePool`].
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: fieldsync_domain::constants::DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Build a pool for the database at `path`.
pub fn create_pool<P: AsRef<Path>>(path: P, config: &PoolConfig) -> Result<SqlitePool> {
    let busy_timeout = config.busy_timeout;
    let manager = SqliteConnectionManager::file(path.as_ref())
        .with_init(move |conn| apply_connection_pragmas(conn, busy_timeout));

    Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|err| {
            warn!(error = %err, "Failed to create connection pool");
            FieldSyncError::from(InfraError::from(err))
        })
}

/// Apply per-connection pragmas.
pub fn apply_connection_pragmas(
    conn: &Connection,
    busy_timeout: Duration,
) -> rusqlite::Result<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(journal_mode = %mode, "WAL journal not available for this database");
    }
    conn.pragma_update(None, "synchronous", "FULL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
