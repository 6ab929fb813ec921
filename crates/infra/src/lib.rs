//! # FieldSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLite-backed durable write store
//! - reqwest transport and reachability probe
//! - Background sync worker
//! - Single-owner PID lock for the queue database
//! - Configuration loading, logging setup and metrics
//!
//! ## Architecture
//! - Implements traits defined in `fieldsync-core`
//! - Depends on `fieldsync-common`, `fieldsync-domain` and `fieldsync-core`
//! - Contains all "impure" code (I/O, network, timers)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod instance_lock;
pub mod notifications;
pub mod observability;
pub mod sync;

// Re-export commonly used items
pub use database::*;
pub use errors::InfraError;
pub use http::*;
pub use instance_lock::InstanceLock;
pub use notifications::{
    BroadcastNotificationSink, FanoutNotificationSink, TracingNotificationSink,
};
pub use sync::{
    FlushHandle, HttpConnectivityProbe, HttpWriteTransport, SyncWorker, SyncWorkerConfig,
};
