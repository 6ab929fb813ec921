//! Single-owner lock for a queue database, using a PID file
//!
//! Only the process holding the lock may recover interrupted writes or drain
//! the queue. Other processes (a second CLI invocation next to `fieldsync
//! run`) can still enqueue and inspect, but never replay.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use fieldsync_domain::{FieldSyncError, Result};

/// Held for as long as the value lives; the PID file is removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    pid_file: PathBuf,
}

impl InstanceLock {
    /// PID file guarding the database at `db_path`.
    pub fn path_for_database(db_path: impl AsRef<Path>) -> PathBuf {
        let mut name = db_path.as_ref().as_os_str().to_owned();
        name.push(".pid");
        PathBuf::from(name)
    }

    /// Take the lock, failing if a live process already holds it.
    pub fn acquire(pid_file: impl AsRef<Path>) -> Result<Self> {
        let pid_file = pid_file.as_ref();
        Self::try_acquire(pid_file)?.ok_or_else(|| {
            let holder = read_pid(pid_file)
                .map_or_else(|| "unknown".to_string(), |pid| pid.to_string());
            FieldSyncError::Storage(format!(
                "Another fieldsync process owns this queue (PID: {holder}). Stop it first."
            ))
        })
    }

    /// Take the lock if it is free or stale.
    ///
    /// Returns `Ok(None)` while another live process holds it.
    pub fn try_acquire(pid_file: impl AsRef<Path>) -> Result<Option<Self>> {
        let pid_file = pid_file.as_ref().to_path_buf();

        // Second round only runs after a stale file was removed.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&pid_file) {
                Ok(mut file) => {
                    let pid = std::process::id();
                    file.write_all(pid.to_string().as_bytes()).map_err(|e| {
                        FieldSyncError::Storage(format!("Failed to write PID file: {e}"))
                    })?;
                    tracing::info!(pid, path = %pid_file.display(), "instance_lock.acquired");
                    return Ok(Some(Self { pid_file }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if let Some(pid) = read_pid(&pid_file).filter(|pid| is_process_running(*pid)) {
                        tracing::debug!(existing_pid = pid, "instance_lock.process_active");
                        return Ok(None);
                    }
                    tracing::warn!(
                        path = %pid_file.display(),
                        "instance_lock.stale_pid_file_detected"
                    );
                    if let Err(err) = fs::remove_file(&pid_file) {
                        if err.kind() != ErrorKind::NotFound {
                            return Err(FieldSyncError::Storage(format!(
                                "Failed to remove stale PID file: {err}"
                            )));
                        }
                    }
                }
                Err(e) => {
                    return Err(FieldSyncError::Storage(format!("Failed to create PID file: {e}")));
                }
            }
        }

        // Lost the race for a stale file to another process.
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.pid_file
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.pid_file) {
            tracing::warn!(
                error = %e,
                path = %self.pid_file.display(),
                "instance_lock.remove_pid_failed"
            );
        } else {
            tracing::info!(path = %self.pid_file.display(), "instance_lock.released");
        }
    }
}

fn read_pid(pid_file: &Path) -> Option<u32> {
    fs::read_to_string(pid_file).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn is_process_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_running(pid: u32) -> bool {
    use std::process::Command;

    // `kill -0` probes for existence without sending a signal
    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_process_running(pid: u32) -> bool {
    // Without a portable liveness check, only our own PID counts as live.
    pid == std::process::id()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn second_acquire_fails_until_first_is_dropped() {
        let dir = TempDir::new().unwrap();
        let path = InstanceLock::path_for_database(dir.path().join("queue.db"));

        let first = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_none());
        assert!(matches!(InstanceLock::acquire(&path), Err(FieldSyncError::Storage(_))));

        drop(first);
        assert!(!path.exists());
        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn stale_or_garbled_pid_file_is_taken_over() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("queue.db.pid");

        fs::write(&path, u32::MAX.to_string()).unwrap();
        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(read_pid(lock.path()), Some(std::process::id()));
        drop(lock);

        fs::write(&path, "not a pid").unwrap();
        assert!(InstanceLock::try_acquire(&path).unwrap().is_some());
    }

    #[test]
    fn pid_file_sits_next_to_the_database() {
        let path = InstanceLock::path_for_database("/var/lib/fieldsync/queue.db");
        assert_eq!(path, PathBuf::from("/var/lib/fieldsync/queue.db.pid"));
    }
}
