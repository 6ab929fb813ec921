// Retry policy with capped exponential backoff and optional jitter

pub mod constants;
pub mod policy;

pub use policy::{RetryPolicy, RetryPolicyBuilder};
