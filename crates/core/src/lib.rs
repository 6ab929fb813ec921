//! # FieldSync Core
//!
//! Pure business logic for the offline write queue - no infrastructure
//! dependencies.
//!
//! This crate contains:
//! - Port interfaces (store, transport, notification sink)
//! - The write submitter, sync coordinator and conflict handling
//! - The connectivity monitor
//!
//! ## Architecture Principles
//! - Only depends on `fieldsync-common` and `fieldsync-domain`
//! - No database or HTTP code
//! - All external dependencies via traits

pub mod sync;

pub use sync::classifier::{classify, Classification};
pub use sync::connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use sync::coordinator::{DrainGate, DrainReport, DrainTrigger, GateEntry, SyncCoordinator};
pub use sync::errors::ReplayError;
pub use sync::notifications::NotificationEmitter;
pub use sync::operations::{OperationRegistry, RegisteredOperation};
pub use sync::ports::{
    NotificationSink, TransportError, TransportResponse, WriteRequest, WriteStore, WriteTransport,
};
pub use sync::resolver::{ConflictResolver, Resolution, ResolutionAction, ResolutionPolicy};
pub use sync::submitter::{SubmitOutcome, WriteSubmitter};
