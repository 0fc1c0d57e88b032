use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source for the control cadence and the run loop's pacing.
pub trait Clock {
    fn now(&self) -> Instant;

    /// Block (or pretend to) for `d`.
    fn sleep(&self, d: Duration);

    /// Whole milliseconds from `epoch` to now; 0 if `epoch` lies in the future.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let ms = self.now().saturating_duration_since(epoch).as_millis();
        u64::try_from(ms).unwrap_or(u64::MAX)
    }
}

/// Wall clock used on real hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            std::thread::sleep(d);
        }
    }
}

/// Clock that only moves when advanced or slept on.
///
/// Clones share one counter, so a test keeps a handle while the regulator
/// owns another. Resolution is one microsecond.
#[derive(Debug, Clone)]
pub struct ManualClock {
    start: Instant,
    micros: Arc<AtomicU64>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            micros: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, d: Duration) {
        let step = u64::try_from(d.as_micros()).unwrap_or(u64::MAX);
        // fetch_update never fails when the closure always returns Some
        let _ = self
            .micros
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |us| {
                Some(us.saturating_add(step))
            });
    }

    /// Time advanced so far.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Acquire))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}
