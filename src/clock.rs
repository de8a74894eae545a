//! Time sources for the limiters.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Supplies the current time as an offset from the clock's epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> Duration;
}

/// Monotonic clock whose epoch is the UNIX epoch.
///
/// The wall-clock offset is read once at construction and then advanced with
/// `Instant`, so readings never go backwards while fixed windows still line up
/// with wall-clock minutes.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor: Duration,
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default(),
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.anchor + self.start.elapsed()
    }
}

/// Hand-driven clock for tests. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn at_secs(secs: f64) -> Self {
        Self::new(Duration::from_secs_f64(secs))
    }

    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }

    pub fn set_secs(&self, secs: f64) {
        self.set(Duration::from_secs_f64(secs));
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
        assert!(first > Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_is_shared_between_clones() {
        let clock = ManualClock::at_secs(10.0);
        let other = clock.clone();
        other.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), Duration::from_millis(10_500));

        clock.set_secs(3.0);
        assert_eq!(other.now(), Duration::from_secs(3));
    }
}
