//! Token bucket with continuous refill.
//!
//! A bucket holds up to `max_requests` tokens and refills at
//! `max_requests / window` tokens per second. Each request spends one token;
//! fractional tokens accumulate between requests.

use std::time::Duration;

use super::{secs_to_duration, Algorithm, Decision};
use crate::rate_limit_config::{LimitSpec, RateLimitStrategy};

#[derive(Debug, Clone, PartialEq)]
pub struct TokenBucketState {
    tokens: f64,
    capacity: f64,
    refill_rate: f64, // tokens per second
    last_refill: Duration,
}

impl TokenBucketState {
    pub fn new(spec: &LimitSpec, now: Duration) -> Self {
        let capacity = spec.max_requests as f64;
        Self {
            tokens: capacity,
            capacity,
            refill_rate: spec.refill_rate(),
            last_refill: now,
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    pub fn last_refill(&self) -> Duration {
        self.last_refill
    }

    /// Tokens the bucket would hold at `now`. A clock that moved backwards
    /// counts as no time passing.
    fn tokens_at(&self, now: Duration) -> f64 {
        let elapsed = now.saturating_sub(self.last_refill);
        let tokens_to_add = self.refill_rate * elapsed.as_secs_f64();

        // Prevent overflow by capping at capacity
        (self.tokens + tokens_to_add).clamp(0.0, self.capacity)
    }

    fn refill(&mut self, now: Duration) {
        self.tokens = self.tokens_at(now);
        self.last_refill = self.last_refill.max(now);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenBucket;

impl Algorithm for TokenBucket {
    type State = TokenBucketState;

    fn strategy(&self) -> RateLimitStrategy {
        RateLimitStrategy::TokenBucket
    }

    fn initial_state(&self, now: Duration, spec: &LimitSpec) -> TokenBucketState {
        TokenBucketState::new(spec, now)
    }

    fn check(&self, state: &mut TokenBucketState, now: Duration, _spec: &LimitSpec) -> Decision {
        state.refill(now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Decision::allow(state.tokens.floor() as u32)
        } else {
            let deficit = 1.0 - state.tokens;
            Decision::reject(secs_to_duration(deficit / state.refill_rate))
        }
    }

    fn remaining(&self, state: &TokenBucketState, now: Duration, _spec: &LimitSpec) -> u32 {
        state.tokens_at(now).floor() as u32
    }
}
