// Retry policy with capped exponential backoff and jitter
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};
use crate::sync::retry::constants::{
    DEFAULT_BASE_DELAY, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    MAX_BACKOFF_EXPONENT, MAX_MAX_ATTEMPTS, MIN_MAX_ATTEMPTS,
};

/// Retry/backoff/max-attempts policy shared by every call site that
/// resubmits a write.
///
/// The delay before attempt `n + 1` after `n` failed attempts is
/// `min(base * 2^(n-1), max_delay)`, optionally spread by jitter.
///
/// Jitter is derived from the entry key and the attempt count, so one entry
/// sees the same window on every check while different entries still spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a policy from the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// Get the maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_factor(&self) -> f64 {
        self.jitter_factor
    }

    /// Delay to wait after `attempt_count` failed attempts, without an
    /// entry key.
    ///
    /// Zero attempts means the entry has never been tried and is due now.
    pub fn delay_for_attempt(&self, attempt_count: u32) -> Duration {
        self.delay_for("", attempt_count)
    }

    /// Delay to wait after `attempt_count` failed attempts of entry `key`.
    pub fn delay_for(&self, key: &str, attempt_count: u32) -> Duration {
        if attempt_count == 0 {
            return Duration::ZERO;
        }
        self.apply_jitter(self.calculate_exponential_delay(attempt_count), key, attempt_count)
    }

    /// Check whether another attempt is allowed after `attempt_count` failures
    pub fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }

    /// True once `attempt_count` has reached the configured maximum.
    pub fn is_exhausted(&self, attempt_count: u32) -> bool {
        !self.should_retry(attempt_count)
    }

    /// Earliest instant at which an entry becomes eligible for replay again.
    pub fn next_attempt_at(
        &self,
        key: &str,
        last_attempt_at: Option<DateTime<Utc>>,
        attempt_count: u32,
    ) -> Option<DateTime<Utc>> {
        let last = last_attempt_at?;
        let delay = chrono::Duration::from_std(self.delay_for(key, attempt_count))
            .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
        last.checked_add_signed(delay)
    }

    /// Eligible when `now >= last_attempt_at + delay(attempt_count)`.
    ///
    /// Entries that were never attempted are always eligible.
    pub fn is_eligible(
        &self,
        key: &str,
        last_attempt_at: Option<DateTime<Utc>>,
        attempt_count: u32,
        now: DateTime<Utc>,
    ) -> bool {
        if last_attempt_at.is_none() || attempt_count == 0 {
            return true;
        }
        self.next_attempt_at(key, last_attempt_at, attempt_count).map_or(false, |due| now >= due)
    }

    /// Calculate exponential delay without jitter
    fn calculate_exponential_delay(&self, attempt_count: u32) -> Duration {
        let base_millis = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let max_millis = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);

        // Cap exponent to prevent overflow
        let exponent = attempt_count.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let multiplier = 2_u64.saturating_pow(exponent);

        let delay_millis = base_millis.saturating_mul(multiplier).min(max_millis);
        Duration::from_millis(delay_millis)
    }

    /// Apply jitter to prevent thundering herd
    fn apply_jitter(&self, delay: Duration, key: &str, attempt_count: u32) -> Duration {
        if self.jitter_factor == 0.0 {
            return delay;
        }

        let mut hasher = DefaultHasher::new();
        (key, attempt_count).hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        let delay_millis = delay.as_millis() as f64;
        let jitter_range = delay_millis * self.jitter_factor;

        // Add random jitter: -jitter_range/2 to +jitter_range/2
        let jitter = rng.gen_range(-jitter_range / 2.0..=jitter_range / 2.0);
        let final_millis = (delay_millis + jitter).max(0.0) as u64;

        Duration::from_millis(final_millis)
    }
}

/// Builder for [`RetryPolicy`] that validates on [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        let defaults = RetryPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay: defaults.base_delay,
            max_delay: defaults.max_delay,
            jitter_factor: defaults.jitter_factor,
        }
    }
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = if factor.is_nan() { 0.0 } else { factor.clamp(0.0, 1.0) };
        self
    }

    pub fn build(self) -> CommonResult<RetryPolicy> {
        if !(MIN_MAX_ATTEMPTS..=MAX_MAX_ATTEMPTS).contains(&self.max_attempts) {
            return Err(CommonError::config_field(
                "max_attempts",
                format!(
                    "must be between {} and {}, got {}",
                    MIN_MAX_ATTEMPTS, MAX_MAX_ATTEMPTS, self.max_attempts
                ),
            ));
        }

        if self.base_delay.is_zero() {
            return Err(CommonError::config_field("base_delay", "must be greater than zero"));
        }

        if self.base_delay > self.max_delay {
            return Err(CommonError::config_field(
                "base_delay",
                format!(
                    "base_delay ({:?}) cannot be greater than max_delay ({:?})",
                    self.base_delay, self.max_delay
                ),
            ));
        }

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter_factor: self.jitter_factor,
        })
    }
}
