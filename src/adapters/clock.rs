//! Clock adapters.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

use crate::ports::Clock;

/// The real wall clock. Sleeping blocks the control thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// Hand-driven clock for tests. `sleep` advances the stored time instead
/// of blocking, so a simulated pump run finishes in microseconds.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, dur: ChronoDuration) {
        let mut now = self.now.lock().unwrap();
        *now += dur;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, dur: Duration) {
        let millis = dur.as_millis().min(i64::MAX as u128) as i64;
        self.advance(ChronoDuration::milliseconds(millis));
    }
}
