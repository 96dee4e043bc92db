//! Wall-clock source for window calculations.

use chrono::{DateTime, Utc};

/// Source of the current time used to place messages into buckets.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// System clock backed by `Utc::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock for deterministic window tests.
///
/// Clones share the same underlying time.
#[cfg(test)]
#[derive(Debug, Clone)]
pub(crate) struct MockClock {
    current_time: std::sync::Arc<parking_lot::Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl MockClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self {
            current_time: std::sync::Arc::new(parking_lot::Mutex::new(start)),
        }
    }

    pub(crate) fn advance(&self, by: chrono::Duration) {
        *self.current_time.lock() += by;
    }
}

#[cfg(test)]
impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current_time.lock()
    }
}
