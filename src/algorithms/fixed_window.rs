//! Fixed window counter.
//!
//! Time is cut into windows aligned to multiples of the window length and a
//! counter is reset at each boundary. The reset is a hard cut: a client can
//! spend a full quota just before a boundary and another just after it, so up
//! to twice `max_requests` can land within a very short span. That behavior is
//! kept as-is; use the sliding window when exact limits matter.

use std::time::Duration;

use super::{Algorithm, Decision};
use crate::rate_limit_config::{LimitSpec, RateLimitStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct FixedWindowState {
    window_start: Duration,
    count: u32,
}

impl FixedWindowState {
    pub fn new(spec: &LimitSpec, now: Duration) -> Self {
        Self {
            window_start: window_start(now, spec.window),
            count: 0,
        }
    }

    pub fn window_start(&self) -> Duration {
        self.window_start
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Move to the window containing `now` if it is later than the current one.
    fn roll_forward(&mut self, now: Duration, window: Duration) {
        let current = window_start(now, window);
        if current > self.window_start {
            self.window_start = current;
            self.count = 0;
        }
    }
}

/// Start of the window containing `now`: `floor(now / window) * window`.
pub fn window_start(now: Duration, window: Duration) -> Duration {
    let window_nanos = window.as_nanos().max(1);
    let start = now.as_nanos() / window_nanos * window_nanos;
    Duration::from_nanos(u64::try_from(start).unwrap_or(u64::MAX))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindow;

impl Algorithm for FixedWindow {
    type State = FixedWindowState;

    fn strategy(&self) -> RateLimitStrategy {
        RateLimitStrategy::FixedWindow
    }

    fn initial_state(&self, now: Duration, spec: &LimitSpec) -> FixedWindowState {
        FixedWindowState::new(spec, now)
    }

    fn check(&self, state: &mut FixedWindowState, now: Duration, spec: &LimitSpec) -> Decision {
        state.roll_forward(now, spec.window);

        if state.count < spec.max_requests {
            state.count += 1;
            return Decision::allow(spec.max_requests - state.count);
        }

        Decision::reject(
            state
                .window_start
                .saturating_add(spec.window)
                .saturating_sub(now),
        )
    }

    fn remaining(&self, state: &FixedWindowState, now: Duration, spec: &LimitSpec) -> u32 {
        if window_start(now, spec.window) > state.window_start {
            spec.max_requests
        } else {
            spec.max_requests.saturating_sub(state.count)
        }
    }
}
