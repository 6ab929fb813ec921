//! Configuration structures
//!
//! Every field has a default so partial TOML/JSON files and environment
//! overrides compose cleanly.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BASE_BACKOFF_MS, DEFAULT_BASE_URL, DEFAULT_DB_PATH, DEFAULT_DEBOUNCE_MS,
    DEFAULT_HEALTH_PATH, DEFAULT_HTTP_METHOD, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_SECS,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POOL_SIZE, DEFAULT_PROBE_INTERVAL_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use crate::{FieldSyncError, Result};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub sync: SyncConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
    pub operations: Vec<OperationConfig>,
}

/// Local durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DB_PATH.to_string(), pool_size: DEFAULT_POOL_SIZE }
    }
}

/// Backend the writes are delivered to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub health_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
        }
    }
}

/// Retry and drain scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_secs: u64,
    pub jitter_factor: f64,
    /// Interval of the periodic backoff sweep.
    pub poll_interval_secs: u64,
    /// Stop a module at its first `failed` entry until it is dismissed or
    /// re-queued, instead of draining the entries behind it.
    pub hold_module_on_failure: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            jitter_factor: 0.0,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            hold_module_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub debounce_ms: u64,
    /// Health probe interval; `0` disables the HTTP probe.
    pub probe_interval_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self { debounce_ms: DEFAULT_DEBOUNCE_MS, probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

/// One registered operation type and where it is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationConfig {
    pub operation_type: String,
    pub endpoint: String,
    pub module: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    DEFAULT_HTTP_METHOD.to_string()
}

impl Config {
    /// Range checks that do not depend on other crates.
    ///
    /// Operation table validation happens when the registry is built.
    pub fn validate(&self) -> Result<()> {
        if self.storage.path.trim().is_empty() {
            return Err(FieldSyncError::Config("storage.path must not be empty".to_string()));
        }
        if self.storage.pool_size == 0 {
            return Err(FieldSyncError::Config("storage.pool_size must be at least 1".to_string()));
        }
        if !(self.server.base_url.starts_with("http://")
            || self.server.base_url.starts_with("https://"))
        {
            return Err(FieldSyncError::Config(format!(
                "server.base_url must be an http(s) URL, got '{}'",
                self.server.base_url
            )));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(FieldSyncError::Config(
                "server.request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.sync.max_attempts == 0 {
            return Err(FieldSyncError::Config("sync.max_attempts must be at least 1".to_string()));
        }
        if self.sync.poll_interval_secs == 0 {
            return Err(FieldSyncError::Config(
                "sync.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
