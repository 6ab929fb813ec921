//! Offline write queue: submission, replay and conflict handling.

pub mod classifier;
pub mod connectivity;
pub mod coordinator;
pub mod delivery;
pub mod errors;
pub mod notifications;
pub mod operations;
pub mod ports;
pub mod resolver;
pub mod submitter;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
