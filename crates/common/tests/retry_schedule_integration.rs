//! Integration tests for the replay schedule
//!
//! Drives `RetryPolicy` with a `MockClock` the way the sync coordinator does:
//! record an attempt, advance time, ask whether the entry is due.

#![cfg(feature = "runtime")]

use std::time::Duration;

use fieldsync_common::{Clock, CommonError, MockClock, RetryPolicy};

#[test]
fn default_schedule_doubles_from_two_seconds_to_the_cap() {
    let policy = RetryPolicy::default();
    let delays: Vec<u64> = (1..=9).map(|n| policy.delay_for_attempt(n).as_secs()).collect();

    assert_eq!(delays, vec![2, 4, 8, 16, 32, 64, 128, 256, 300]);
    assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(300));
}

#[test]
fn entry_becomes_due_exactly_when_backoff_elapses() {
    let policy = RetryPolicy::default();
    let clock = MockClock::new();

    let last_attempt = clock.utc_now();
    assert!(!policy.is_eligible("w-1", Some(last_attempt), 3, clock.utc_now()));

    clock.advance(Duration::from_millis(7_999));
    assert!(!policy.is_eligible("w-1", Some(last_attempt), 3, clock.utc_now()));

    clock.advance(Duration::from_millis(1));
    assert!(policy.is_eligible("w-1", Some(last_attempt), 3, clock.utc_now()));
}

#[test]
fn never_attempted_entries_are_always_due() {
    let policy = RetryPolicy::default();
    let clock = MockClock::new();

    assert!(policy.is_eligible("w-1", None, 0, clock.utc_now()));
    assert!(policy.is_eligible("w-1", Some(clock.utc_now()), 0, clock.utc_now()));
    assert_eq!(policy.next_attempt_at("w-1", None, 2), None);
}

#[test]
fn exhaustion_follows_max_attempts() {
    let policy = RetryPolicy::builder().max_attempts(3).build().unwrap();

    assert!(policy.should_retry(2));
    assert!(policy.is_exhausted(3));
    assert!(policy.is_exhausted(4));
}

#[test]
fn builder_rejects_inconsistent_bounds() {
    let result = RetryPolicy::builder()
        .base_delay(Duration::from_secs(10))
        .max_delay(Duration::from_secs(5))
        .build();
    assert!(matches!(result, Err(CommonError::Config { .. })));

    assert!(RetryPolicy::builder().max_attempts(0).build().is_err());
    assert!(RetryPolicy::builder().max_attempts(101).build().is_err());
}

#[test]
fn jitter_stays_within_half_the_range() {
    let policy = RetryPolicy::builder()
        .base_delay(Duration::from_secs(10))
        .max_delay(Duration::from_secs(10))
        .jitter_factor(0.5)
        .build()
        .unwrap();

    for n in 0..50 {
        let delay = policy.delay_for(&format!("w-{n}"), 1);
        assert!(delay >= Duration::from_millis(7_500), "{delay:?}");
        assert!(delay <= Duration::from_millis(12_500), "{delay:?}");
    }
}

#[test]
fn jittered_entry_does_not_flap_between_sweeps() {
    let policy = RetryPolicy::builder()
        .base_delay(Duration::from_secs(10))
        .max_delay(Duration::from_secs(10))
        .jitter_factor(1.0)
        .build()
        .unwrap();
    let clock = MockClock::new();
    let last_attempt = clock.utc_now();
    let window = policy.delay_for("w-7", 1);

    clock.advance(window - Duration::from_millis(1));
    for _ in 0..25 {
        assert!(!policy.is_eligible("w-7", Some(last_attempt), 1, clock.utc_now()));
    }

    clock.advance(Duration::from_millis(1));
    for _ in 0..25 {
        assert!(policy.is_eligible("w-7", Some(last_attempt), 1, clock.utc_now()));
    }
}
