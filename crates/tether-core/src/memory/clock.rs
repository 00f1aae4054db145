//! Monotonic millisecond clock for record keys.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

/// Issues strictly increasing millisecond timestamps.
///
/// If the wall clock has not advanced (or went backwards) since the last
/// tick, the next value is `last + 1`. Two writers sharing a clock never
/// receive the same timestamp.
#[derive(Debug, Default)]
pub struct KeyClock {
    last: AtomicI64,
}

impl KeyClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}
