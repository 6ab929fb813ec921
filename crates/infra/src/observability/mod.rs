//! Observability infrastructure: logging setup and sync metrics.
//!
//! ## Design Principles
//!
//! 1. **Future-Proof Returns**: All record methods return `MetricsResult<()>`
//!    so that quotas or validation can be added without API breakage; they
//!    currently always succeed.
//!
//! 2. **Logging is `tracing`**: [`init_tracing`] installs a
//!    `tracing-subscriber` formatter; `RUST_LOG` overrides the configured
//!    level.
//!
//! ## Error Handling
//!
//! ```rust
//! use fieldsync_infra::observability::metrics::SyncMetrics;
//!
//! let metrics = SyncMetrics::new();
//!
//! if let Err(e) = metrics.record_coalesced() {
//!     tracing::warn!("Failed to record metric: {}", e);
//! }
//! ```

pub mod metrics;

use fieldsync_domain::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Metrics error type
///
/// Reserved for future limits; recording currently never fails.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Empty data set - cannot calculate aggregate metric
    #[error("Empty data: cannot calculate {metric}")]
    EmptyData {
        /// Metric name that failed
        metric: &'static str,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `config.level`. Returns `false` if a subscriber was
/// already installed (tests, embedding hosts).
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().with_target(false).try_init().is_ok()
    } else {
        builder.with_target(false).try_init().is_ok()
    };

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "logging initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected_without_panicking() {
        let config = LoggingConfig { level: "debug".into(), json: false };
        let _ = init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
