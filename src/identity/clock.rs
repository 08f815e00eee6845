use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Wall-clock source for expiry arithmetic. `exp` is absolute Unix time, so the
/// guard compares against real UTC rather than a monotonic instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Hand-driven clock for tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self { Self { now: Mutex::new(at) } }

    pub fn starting_now() -> Self { Self::new(Utc::now()) }

    pub fn advance(&self, by: Duration) {
        let mut g = self.now.lock();
        *g += by;
    }

    pub fn set(&self, at: DateTime<Utc>) { *self.now.lock() = at; }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> { *self.now.lock() }
}
