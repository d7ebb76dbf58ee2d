//! Clock abstraction for TTL handling

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of the current wall-clock time in epoch seconds.
pub trait Clock: Send + Sync {
    fn epoch_secs(&self) -> i64;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fake clock for testing with controllable time
#[derive(Debug, Clone)]
pub struct FakeClock {
    epoch_secs: Arc<AtomicI64>,
}

impl FakeClock {
    pub fn new(epoch_secs: i64) -> Self {
        Self {
            epoch_secs: Arc::new(AtomicI64::new(epoch_secs)),
        }
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: i64) {
        self.epoch_secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, epoch_secs: i64) {
        self.epoch_secs.store(epoch_secs, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new(1_000_000)
    }
}

impl Clock for FakeClock {
    fn epoch_secs(&self) -> i64 {
        self.epoch_secs.load(Ordering::SeqCst)
    }
}
