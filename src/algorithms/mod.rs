//! Rate limiting algorithms module
//!
//! Each algorithm owns no state of its own: it is handed the per-key state by
//! the store, evaluates one request at time `now` and updates that state in
//! place. Which algorithm runs is fixed when the limiter is built.

pub mod fixed_window;
pub mod sliding_window;
pub mod token_bucket;

use std::time::Duration;

use crate::rate_limit_config::{LimitSpec, RateLimitStrategy};

pub use fixed_window::{FixedWindow, FixedWindowState};
pub use sliding_window::{SlidingWindow, SlidingWindowState};
pub use token_bucket::{TokenBucket, TokenBucketState};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    /// Estimate of requests still admissible right now.
    pub remaining: u32,
    /// How long to wait before retrying. Zero when allowed.
    pub retry_after: Duration,
}

impl Decision {
    pub fn allow(remaining: u32) -> Self {
        Self {
            allowed: true,
            remaining,
            retry_after: Duration::ZERO,
        }
    }

    pub fn reject(retry_after: Duration) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    pub fn retry_after_secs(&self) -> f64 {
        self.retry_after.as_secs_f64()
    }
}

/// Whole seconds for a `Retry-After` header, rounded up and never below one.
pub fn retry_after_header(retry_after: Duration) -> u64 {
    let secs = retry_after
        .as_secs()
        .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
    secs.max(1)
}

/// Convert fractional seconds to a `Duration`, clamping negatives to zero.
pub(crate) fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Trait for rate limiting algorithms
pub trait Algorithm: Send + Sync + 'static {
    /// Per-key state this algorithm reads and updates.
    type State: Send + Clone + std::fmt::Debug + 'static;

    fn strategy(&self) -> RateLimitStrategy;

    /// State for a key seen for the first time at `now`.
    fn initial_state(&self, now: Duration, spec: &LimitSpec) -> Self::State;

    /// Decide whether one request at `now` is admitted, updating `state`.
    fn check(&self, state: &mut Self::State, now: Duration, spec: &LimitSpec) -> Decision;

    /// Requests that would be admitted at `now`, without touching `state`.
    fn remaining(&self, state: &Self::State, now: Duration, spec: &LimitSpec) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_header_rounds_up() {
        assert_eq!(retry_after_header(Duration::from_secs(6)), 6);
        assert_eq!(retry_after_header(Duration::from_millis(6_001)), 7);
        assert_eq!(retry_after_header(Duration::from_millis(100)), 1);
        assert_eq!(retry_after_header(Duration::ZERO), 1);
        assert_eq!(retry_after_header(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_secs_to_duration_clamps() {
        assert_eq!(secs_to_duration(-3.0), Duration::ZERO);
        assert_eq!(secs_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(secs_to_duration(1.5), Duration::from_millis(1_500));
    }
}
