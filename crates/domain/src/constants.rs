//! Application constants
//!
//! Centralized location for domain-level defaults shared by the config
//! structures and the sync runtime.

// Storage
pub const DEFAULT_DB_PATH: &str = "fieldsync.db";
pub const DEFAULT_POOL_SIZE: u32 = 4;

// Server
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_USER_AGENT: &str = concat!("fieldsync/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_HEALTH_PATH: &str = "/health";

// Sync
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 2_000;
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

// Connectivity
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;

/// Header carrying the pending-write id on every replay.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Stored error descriptions are cut to this many characters.
pub const MAX_ERROR_LENGTH: usize = 256;

pub const DEFAULT_HTTP_METHOD: &str = "POST";
