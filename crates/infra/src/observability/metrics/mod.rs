//! Metrics collection modules
//!
//! Thread-safe counters for the sync runtime.

pub mod sync;

pub use sync::{SyncMetrics, SyncMetricsSnapshot};
