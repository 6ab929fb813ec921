//! Sync runtime: HTTP transport, reachability probe and background worker.

pub mod http_transport;
pub mod probe;
pub mod worker;

pub use http_transport::HttpWriteTransport;
pub use probe::HttpConnectivityProbe;
pub use worker::{FlushHandle, SyncWorker, SyncWorkerConfig};
