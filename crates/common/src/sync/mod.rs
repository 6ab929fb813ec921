//! Synchronization primitives shared by the write queue and its workers.
//!
//! ## Submodules
//!
//! - **`retry`**: the single retry/backoff policy used by the submitter, the
//!   sync coordinator and the periodic backoff sweep.

pub mod retry;

pub use retry::{RetryPolicy, RetryPolicyBuilder};
