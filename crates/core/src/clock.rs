// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Session rows persist wall time as epoch milliseconds (`created_at`,
//! `last_used_at`), while process metrics and idle cutoffs measure against
//! the monotonic clock. Components take a `Clock` handle so tests can move
//! both together.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Fake clock for tests.
///
/// Both views derive from one controllable offset over a fixed base, so
/// the wall and monotonic readings can never drift apart mid-test: a
/// session timestamped at `epoch_ms()` and an idle age measured from
/// `now()` always agree on how much time has passed.
#[derive(Clone)]
pub struct FakeClock {
    base_instant: Instant,
    base_epoch_ms: u64,
    elapsed: Arc<Mutex<Duration>>,
}

impl FakeClock {
    /// Starts at an arbitrary fixed epoch (1,000,000 ms).
    pub fn new() -> Self {
        Self::at_epoch_ms(1_000_000)
    }

    /// Start the wall view at a specific epoch-milliseconds value.
    pub fn at_epoch_ms(base_epoch_ms: u64) -> Self {
        Self {
            base_instant: Instant::now(),
            base_epoch_ms,
            elapsed: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move time forward. All clones observe the jump.
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base_instant + *self.elapsed.lock()
    }

    fn epoch_ms(&self) -> u64 {
        self.base_epoch_ms + self.elapsed.lock().as_millis() as u64
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
