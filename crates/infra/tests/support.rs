#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use fieldsync_infra::database::{DbManager, SqlitePendingWriteStore};
use tempfile::TempDir;

/// Temporary database that keeps its directory alive for the duration of a
/// test run and can be reopened to simulate a restart.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    path: PathBuf,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("queue.db");
        let manager = DbManager::open(&path, 4).expect("db manager should be created");

        Self { manager: Arc::new(manager), path, _temp_dir: temp_dir }
    }

    pub fn store(&self) -> Arc<SqlitePendingWriteStore> {
        Arc::new(SqlitePendingWriteStore::new(Arc::clone(&self.manager)))
    }

    /// Fresh manager over the same file, as after an app restart.
    pub fn reopen(&self) -> Arc<DbManager> {
        Arc::new(DbManager::open(&self.path, 4).expect("db should reopen"))
    }

    pub fn execute_batch(&self, sql: &str) {
        let conn = self
            .manager
            .get_connection()
            .expect("connection should be available for execute_batch");
        conn.execute_batch(sql).expect("SQL batch execution should succeed");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
