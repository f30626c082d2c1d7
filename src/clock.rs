use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;

/// Time source shared by the engine, the usage recorder and the recommender.
///
/// `now` is monotonic and only meaningful relative to other `now` readings.
pub trait Clock {
    fn now(&self) -> Duration;
    fn epoch_seconds(&self) -> i64;
    /// Local hour of day, `0..24`.
    fn local_hour(&self) -> u8;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn epoch_seconds(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs() as i64)
            .unwrap_or(0)
    }

    fn local_hour(&self) -> u8 {
        OffsetDateTime::now_local()
            .unwrap_or_else(|_| OffsetDateTime::now_utc())
            .hour()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    inner: Rc<ManualTime>,
}

#[derive(Default)]
struct ManualTime {
    elapsed: Cell<Duration>,
    epoch: Cell<i64>,
    hour: Cell<u8>,
}

impl ManualClock {
    pub fn new(epoch_seconds: i64, hour: u8) -> Self {
        let clock = Self::default();
        clock.inner.epoch.set(epoch_seconds);
        clock.inner.hour.set(hour % 24);
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.inner.elapsed.set(self.inner.elapsed.get() + by);
        self.inner
            .epoch
            .set(self.inner.epoch.get().saturating_add(by.as_secs() as i64));
    }

    pub fn set_hour(&self, hour: u8) {
        self.inner.hour.set(hour % 24);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.elapsed.get()
    }

    fn epoch_seconds(&self) -> i64 {
        self.inner.epoch.get()
    }

    fn local_hour(&self) -> u8 {
        self.inner.hour.get()
    }
}
