//! Time source abstraction.
//!
//! Farming intervals are measured against an injected [`Clock`] so that tests
//! can move time forward (or backwards, to simulate skew) deterministically.

use chrono::{DateTime, Duration, Utc};
use crate::sync::lock;
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *lock(&self.current) = at;
    }

    /// Moves the clock by `by`; negative durations rewind it.
    pub fn advance(&self, by: Duration) {
        *lock(&self.current) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_moves_both_ways() {
        let start = Utc::now();
        let clock = ManualClock::new(start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        clock.advance(Duration::seconds(-120));
        assert_eq!(clock.now(), start - Duration::seconds(30));
    }
}
