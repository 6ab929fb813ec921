//! Time abstractions used by the sync runtime.

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
