//! CLI commands
//!
//! Each command takes the shared [`AppContext`](crate::context::AppContext),
//! logs its execution time and returns a domain `Result`; rendering is left to
//! the binary.

pub mod queue;
pub mod sync;

pub use queue::{dismiss, list, status, submit, StatusReport};
pub use sync::{flush, run, FlushOutcome};
