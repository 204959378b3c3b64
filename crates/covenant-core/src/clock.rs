//! # Clock Port
//!
//! The engine never reads wall-clock time directly. Every time-gated
//! decision goes through the [`Clock`] trait, supplied by the hosting
//! environment. Time gates are evaluated lazily at call time — nothing is
//! pre-scheduled, so there are no timers and no cancellation semantics.
//!
//! Two implementations ship with the crate: [`SystemClock`] for production
//! and [`ManualClock`] for tests, which only moves when explicitly
//! advanced.

use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::temporal::Timestamp;

/// Supplies the current time to the engine.
///
/// Implementations must be monotonically non-decreasing: a later call to
/// [`now`](Clock::now) never returns an earlier timestamp than a prior
/// call.
pub trait Clock: Send + Sync {
    /// The current time.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system's UTC time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_utc(Utc::now())
    }
}

/// Test clock that only moves when told to.
///
/// Cloning shares the underlying instant, so a clock handed to the ledger
/// and a clone kept by the test advance together.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Create a manual clock starting at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by `secs` seconds.
    ///
    /// Saturates at the representable maximum rather than going backward,
    /// preserving the monotonicity contract.
    pub fn advance(&self, secs: u64) {
        let mut current = self.current.lock();
        if let Ok(next) = current.plus_seconds(secs) {
            *current = next;
        }
    }

    /// Set the clock to `instant` if it is not earlier than the current
    /// reading. Earlier instants are ignored.
    pub fn set(&self, instant: Timestamp) {
        let mut current = self.current.lock();
        if instant >= *current {
            *current = instant;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.current.lock()
    }
}
