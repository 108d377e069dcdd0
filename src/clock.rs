//! Time source used to resolve "now" in accumulation queries

use crate::sample::Timestamp;
use chrono::Utc;
use parking_lot::RwLock;

/// Source of the current instant
pub trait Clock: Send + Sync {
    /// The current instant
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    instant: RwLock<Timestamp>,
}

impl FixedClock {
    /// Create a clock frozen at `instant`
    pub fn new(instant: Timestamp) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Move the clock to `instant`
    pub fn set(&self, instant: Timestamp) {
        *self.instant.write() = instant;
    }

    /// Move the clock forward
    pub fn advance(&self, by: chrono::Duration) {
        let mut instant = self.instant.write();
        *instant += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.instant.read()
    }
}
