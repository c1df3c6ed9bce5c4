use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Server clock for message timestamps.
///
/// Readings have microsecond precision (what the store keeps) and strictly
/// increase, even if the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut prev = self.last_micros.load(Ordering::Relaxed);

        loop {
            let next = wall.max(prev + 1);
            match self.last_micros.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => prev = actual,
            }
        }
    }
}
