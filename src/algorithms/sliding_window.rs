//! Sliding window rate limiting algorithm
//!
//! Records the time of every admitted request and counts only those inside
//! the trailing window. The count over any span of `window` is exact, so
//! there is no boundary slack.

use std::collections::VecDeque;
use std::time::Duration;

use super::{Algorithm, Decision};
use crate::rate_limit_config::{LimitSpec, RateLimitStrategy};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlidingWindowState {
    /// Admission times, oldest first.
    timestamps: VecDeque<Duration>,
}

impl SlidingWindowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = Duration> + '_ {
        self.timestamps.iter().copied()
    }

    /// Drop every timestamp at or before `now - window`.
    fn purge(&mut self, now: Duration, window: Duration) {
        let Some(cutoff) = now.checked_sub(window) else {
            return;
        };
        while self.timestamps.front().is_some_and(|ts| *ts <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    fn live_count(&self, now: Duration, window: Duration) -> usize {
        match now.checked_sub(window) {
            Some(cutoff) => self.timestamps.iter().filter(|ts| **ts > cutoff).count(),
            None => self.timestamps.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

impl Algorithm for SlidingWindow {
    type State = SlidingWindowState;

    fn strategy(&self) -> RateLimitStrategy {
        RateLimitStrategy::SlidingWindow
    }

    fn initial_state(&self, _now: Duration, _spec: &LimitSpec) -> SlidingWindowState {
        SlidingWindowState::new()
    }

    fn check(&self, state: &mut SlidingWindowState, now: Duration, spec: &LimitSpec) -> Decision {
        state.purge(now, spec.window);

        let max_requests = spec.max_requests as usize;
        if state.timestamps.len() < max_requests {
            // A regressed clock must not break the ordering the purge relies on.
            let at = state.timestamps.back().map_or(now, |last| now.max(*last));
            state.timestamps.push_back(at);
            return Decision::allow((max_requests - state.timestamps.len()) as u32);
        }

        let retry_after = state
            .timestamps
            .front()
            .map(|oldest| oldest.saturating_add(spec.window).saturating_sub(now))
            .unwrap_or_default();
        Decision::reject(retry_after)
    }

    fn remaining(&self, state: &SlidingWindowState, now: Duration, spec: &LimitSpec) -> u32 {
        (spec.max_requests as usize).saturating_sub(state.live_count(now, spec.window)) as u32
    }
}
