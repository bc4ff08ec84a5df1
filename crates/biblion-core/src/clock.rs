//! Injectable time source.
//!
//! All date math in the engine (due dates, overdue projection, fines) goes
//! through a [`Clock`] so tests can pin or advance time deterministically.

use chrono::{DateTime, Duration, Utc};
use std::sync::RwLock;

/// Time source for the circulation engine.
pub trait Clock: Send + Sync {
    /// Current instant in UTC.
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

/// A clock pinned to an explicit instant, advanced manually.
///
/// Intended for tests: start at a known time, then `advance_days(17)` to
/// exercise overdue and fine accrual without sleeping.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned to the given instant.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Create a clock pinned to the current wall-clock instant.
    pub fn from_system() -> Self {
        Self::new(Utc::now())
    }

    /// Replace the pinned instant.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().expect("clock lock poisoned") = now;
    }

    /// Advance the pinned instant by a duration.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().expect("clock lock poisoned");
        *now += by;
    }

    /// Advance the pinned instant by whole days.
    pub fn advance_days(&self, days: i64) {
        self.advance(Duration::days(days));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().expect("clock lock poisoned")
    }
}
