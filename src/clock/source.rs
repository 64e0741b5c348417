//! Wall-clock sources

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall-clock time in nanoseconds since the Unix epoch
pub type Nanos = i64;

/// A source of "now" in the shared reference time base
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> Nanos;
}

/// Realtime clock that never goes backwards.
///
/// If the system clock is stepped back, readings hold at the last value
/// until real time catches up.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now_ns(&self) -> Nanos {
        // None only past the year 2262
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
        let prev = self.last.fetch_max(now, Ordering::AcqRel);
        prev.max(now)
    }
}

/// Manually advanced clock for driving the pipeline deterministically
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: Nanos) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    pub fn set(&self, now: Nanos) {
        self.now.store(now, Ordering::Release);
    }

    pub fn advance(&self, by: Nanos) {
        self.now.fetch_add(by, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> Nanos {
        self.now.load(Ordering::Acquire)
    }
}
