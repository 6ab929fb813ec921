//! Modular common utilities shared across FieldSync crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: error classification and the retry/backoff policy
//! - `runtime`: wall-clock abstraction used by the sync coordinator
//! - `test-utils`: the runtime tier, for crates that only need it in tests

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;
#[cfg(feature = "foundation")]
pub mod sync;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod time;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{CommonError, CommonResult, ErrorClassification, ErrorSeverity};
#[cfg(feature = "foundation")]
pub use sync::retry::{RetryPolicy, RetryPolicyBuilder};
#[cfg(feature = "runtime")]
pub use time::{Clock, MockClock, SystemClock};
