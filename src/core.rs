//! Core server timing
//!
//! This module provides:
//! - The server tick rate
//! - The tick clock every connection deadline is measured against

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};

/// Server tick rate in nanoseconds (10ms = 10,000,000 ns)
/// This controls how fast the main server loop runs
pub const SERVER_TICK_RATE_NS: u64 = 10_000_000;

/// Server tick rate as a Duration for convenience
pub const SERVER_TICK_RATE: Duration = Duration::from_nanos(SERVER_TICK_RATE_NS);

/// Millisecond tick clock.
///
/// `time()` is the value sampled at the start of the current tick, so every
/// connection processed in one tick sees the same instant. A manual clock
/// only moves through `set`/`advance`.
pub struct Clock {
    epoch: Instant,
    started_at: DateTime<Utc>,
    millis: AtomicI64,
    manual: bool,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            // Dates go on the wire as milliseconds.
            started_at: Utc::now().trunc_subsecs(3),
            millis: AtomicI64::new(0),
            manual: false,
        }
    }

    /// A clock that never follows the wall clock.
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::new()
        }
    }

    /// Milliseconds since the clock started, as of the last update.
    pub fn time(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }

    /// Wall-clock view of `time()`.
    pub fn now(&self) -> DateTime<Utc> {
        self.started_at + chrono::Duration::milliseconds(self.time())
    }

    /// Samples the wall clock. Called once per tick.
    pub fn update(&self) {
        if self.manual {
            return;
        }
        let elapsed = i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX);
        self.millis.store(elapsed, Ordering::Release);
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::Release);
    }

    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(SERVER_TICK_RATE_NS, 10_000_000);
        assert_eq!(SERVER_TICK_RATE, Duration::from_millis(10));
    }

    #[test]
    fn test_manual_clock() {
        let clock = Clock::manual();
        assert_eq!(clock.time(), 0);
        clock.advance(250);
        clock.update();
        assert_eq!(clock.time(), 250);
        clock.set(1_000);
        assert_eq!(clock.time(), 1_000);
    }

    #[test]
    fn test_now_follows_time() {
        let clock = Clock::manual();
        let start = clock.now();
        clock.advance(1_500);
        assert_eq!((clock.now() - start).num_milliseconds(), 1_500);
    }

    #[test]
    fn test_now_has_millisecond_precision() {
        let clock = Clock::new();
        clock.advance(7);
        assert_eq!(clock.now().timestamp_subsec_nanos() % 1_000_000, 0);
        assert_eq!(
            DateTime::from_timestamp_millis(clock.now().timestamp_millis()),
            Some(clock.now())
        );
    }

    #[test]
    fn test_real_clock_is_monotonic() {
        let clock = Clock::new();
        clock.update();
        let first = clock.time();
        std::thread::sleep(Duration::from_millis(5));
        clock.update();
        assert!(clock.time() >= first + 5);
    }
}
