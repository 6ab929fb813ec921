//! Time abstraction for testability
//!
//! Backoff eligibility is computed against wall-clock timestamps that are
//! persisted with each pending write, so the coordinator reads time through
//! this trait and tests drive it with [`MockClock`].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use fieldsync_common::time::{Clock, MockClock};
//!
//! let mock = MockClock::new();
//! let start = mock.utc_now();
//! mock.advance(Duration::from_secs(5));
//! assert_eq!((mock.utc_now() - start).num_seconds(), 5);
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Trait for time operations to enable testing
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Current wall clock time as a UTC timestamp.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Get milliseconds since UNIX epoch
    fn millis_since_epoch(&self) -> u64 {
        let millis =
            self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX)
    }
}

/// Real system clock implementation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock clock for deterministic testing
///
/// Clones share the same elapsed time, so a clock handed to the coordinator
/// can be advanced from the test body.
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    elapsed: Arc<Mutex<Duration>>,
    base_system_time: SystemTime,
}

impl MockClock {
    /// Create a new mock clock starting at the current real time
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Create a mock clock whose wall-clock reading starts at `base`.
    pub fn starting_at(base: SystemTime) -> Self {
        Self {
            start: Instant::now(),
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
            base_system_time: base,
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed += duration;
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(PoisonError::into_inner);
        *elapsed = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for time::clock.
    use super::*;

    /// Validates the system clock scenario.
    ///
    /// Assertions:
    /// - Ensures `now2 >= now1` evaluates to true.
    /// - Ensures `millis > 0` evaluates to true.
    #[test]
    fn test_system_clock() {
        let clock = SystemClock;
        let now1 = clock.now();
        let now2 = clock.now();

        assert!(now2 >= now1);
        assert!(clock.millis_since_epoch() > 0);
    }

    /// Validates `MockClock::new` behavior for the mock clock advance scenario.
    ///
    /// Assertions:
    /// - Confirms `after.duration_since(start)` equals
    ///   `Duration::from_secs(5)`.
    /// - Confirms the UTC reading moves by the same amount.
    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new();
        let start = clock.now();
        let start_utc = clock.utc_now();

        clock.advance(Duration::from_secs(5));

        assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
        assert_eq!((clock.utc_now() - start_utc).num_milliseconds(), 5_000);
    }

    /// Validates `MockClock::starting_at` behavior for the fixed base time
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `millis_since_epoch` reflects the base plus elapsed time.
    #[test]
    fn test_mock_clock_starting_at() {
        let base = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let clock = MockClock::starting_at(base);
        clock.set_elapsed(Duration::from_millis(250));

        assert_eq!(clock.millis_since_epoch(), 1_700_000_000_250);
    }

    /// Validates `MockClock::new` behavior for the mock clock clone scenario.
    ///
    /// Assertions:
    /// - Confirms `clock2.elapsed()` equals `Duration::from_secs(15)`.
    #[test]
    fn test_mock_clock_clone_shares_time() {
        let clock1 = MockClock::new();
        clock1.advance(Duration::from_secs(10));

        let clock2 = clock1.clone();
        clock1.advance(Duration::from_secs(5));
        assert_eq!(clock2.elapsed(), Duration::from_secs(15));
    }
}
