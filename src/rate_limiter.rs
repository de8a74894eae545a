use std::sync::Arc;
use tracing::{debug, trace};

use crate::algorithms::{Algorithm, Decision, FixedWindow, SlidingWindow, TokenBucket};
use crate::clock::{Clock, MonotonicClock};
use crate::error::Result;
use crate::key::{EndpointClass, RateLimitKey};
use crate::rate_limit_config::{LimitSpec, RateLimitConfig, RateLimitStrategy};
use crate::store::KeyedStore;

/// One endpoint class enforced by one algorithm.
pub struct Limiter<A: Algorithm> {
    algorithm: A,
    endpoint_class: EndpointClass,
    spec: LimitSpec,
    store: KeyedStore<A::State>,
    clock: Arc<dyn Clock>,
}

impl<A: Algorithm> Limiter<A> {
    pub fn new(
        algorithm: A,
        endpoint_class: EndpointClass,
        spec: LimitSpec,
        clock: Arc<dyn Clock>,
        max_tracked_keys: Option<usize>,
    ) -> Result<Self> {
        spec.validate()?;
        Ok(Self {
            algorithm,
            endpoint_class,
            spec,
            store: KeyedStore::with_max_keys(max_tracked_keys),
            clock,
        })
    }

    fn key(&self, identity: &str) -> RateLimitKey {
        RateLimitKey::new(identity, self.endpoint_class)
    }

    /// Copy of the state held for `identity`, if any.
    pub fn state(&self, identity: &str) -> Option<A::State> {
        self.store.peek(&self.key(identity), |state| state.clone())
    }
}

/// Object-safe view of a [`Limiter`], so the facade can hold any algorithm.
pub trait Policy: Send + Sync {
    fn check(&self, identity: &str) -> Decision;

    /// Requests `identity` could make right now. Never changes state.
    fn remaining(&self, identity: &str) -> u32;

    fn reset(&self, identity: &str) -> bool;

    fn reset_all(&self);

    fn tracked_keys(&self) -> usize;

    fn spec(&self) -> &LimitSpec;

    fn strategy(&self) -> RateLimitStrategy;
}

impl<A: Algorithm> Policy for Limiter<A> {
    fn check(&self, identity: &str) -> Decision {
        let key = self.key(identity);

        // Time is read under the key's lock so same-key checks see it in order.
        let (decision, now) = self.store.with_lock(
            &key,
            || self.algorithm.initial_state(self.clock.now(), &self.spec),
            |state| {
                let now = self.clock.now();
                (self.algorithm.check(state, now, &self.spec), now)
            },
        );

        trace!(
            key = %key,
            strategy = %self.algorithm.strategy(),
            now = now.as_secs_f64(),
            allowed = decision.allowed,
            remaining = decision.remaining,
            "Checked rate limit"
        );

        if !decision.allowed {
            debug!(
                key = %key,
                limit = self.spec.max_requests,
                retry_after = decision.retry_after_secs(),
                "Rate limit exceeded"
            );
        }

        decision
    }

    fn remaining(&self, identity: &str) -> u32 {
        let now = self.clock.now();
        self.store
            .peek(&self.key(identity), |state| {
                self.algorithm.remaining(state, now, &self.spec)
            })
            .unwrap_or(self.spec.max_requests)
    }

    fn reset(&self, identity: &str) -> bool {
        let key = self.key(identity);
        let removed = self.store.remove(&key);
        if removed {
            debug!(key = %key, "Reset rate limit");
        }
        removed
    }

    fn reset_all(&self) {
        self.store.clear();
    }

    fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    fn spec(&self) -> &LimitSpec {
        &self.spec
    }

    fn strategy(&self) -> RateLimitStrategy {
        self.algorithm.strategy()
    }
}

/// Rate limiter facade: one policy per endpoint class, chosen at construction.
#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    shorten: Arc<dyn Policy>,
    redirect: Arc<dyn Policy>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let shorten = build_policy(&config, EndpointClass::Shorten, Arc::clone(&clock))?;
        let redirect = build_policy(&config, EndpointClass::Redirect, clock)?;

        debug!(
            strategy = %config.strategy,
            shorten_limit = config.shorten.max_requests,
            shorten_window = config.shorten.window.as_secs_f64(),
            redirect_limit = config.redirect.max_requests,
            redirect_window = config.redirect.window.as_secs_f64(),
            max_tracked_keys = ?config.max_tracked_keys,
            "Rate limiter initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            shorten,
            redirect,
        })
    }

    fn policy(&self, endpoint_class: EndpointClass) -> &dyn Policy {
        match endpoint_class {
            EndpointClass::Shorten => self.shorten.as_ref(),
            EndpointClass::Redirect => self.redirect.as_ref(),
        }
    }

    /// Decide whether `identity` may make one more `endpoint_class` request.
    pub fn check(&self, identity: &str, endpoint_class: EndpointClass) -> Decision {
        self.policy(endpoint_class).check(identity)
    }

    pub fn remaining(&self, identity: &str, endpoint_class: EndpointClass) -> u32 {
        self.policy(endpoint_class).remaining(identity)
    }

    /// Forget the state for one key. Returns whether anything was stored.
    pub fn reset(&self, identity: &str, endpoint_class: EndpointClass) -> bool {
        self.policy(endpoint_class).reset(identity)
    }

    pub fn reset_all(&self) {
        for endpoint_class in EndpointClass::ALL {
            self.policy(endpoint_class).reset_all();
        }
        debug!("Reset all rate limits");
    }

    pub fn tracked_keys(&self, endpoint_class: EndpointClass) -> usize {
        self.policy(endpoint_class).tracked_keys()
    }

    pub fn spec(&self, endpoint_class: EndpointClass) -> &LimitSpec {
        self.policy(endpoint_class).spec()
    }

    pub fn strategy(&self) -> RateLimitStrategy {
        self.config.strategy
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

fn build_policy(
    config: &RateLimitConfig,
    endpoint_class: EndpointClass,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn Policy>> {
    let spec = *config.spec_for(endpoint_class);
    let max_keys = config.max_tracked_keys;

    let policy: Arc<dyn Policy> = match config.strategy {
        RateLimitStrategy::TokenBucket => Arc::new(Limiter::new(
            TokenBucket,
            endpoint_class,
            spec,
            clock,
            max_keys,
        )?),
        RateLimitStrategy::SlidingWindow => Arc::new(Limiter::new(
            SlidingWindow,
            endpoint_class,
            spec,
            clock,
            max_keys,
        )?),
        RateLimitStrategy::FixedWindow => Arc::new(Limiter::new(
            FixedWindow,
            endpoint_class,
            spec,
            clock,
            max_keys,
        )?),
    };

    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn limiter(strategy: RateLimitStrategy, clock: &ManualClock) -> RateLimiter {
        RateLimiter::with_clock(
            RateLimitConfig::with_strategy(strategy),
            Arc::new(clock.clone()),
        )
        .unwrap()
    }

    #[test]
    fn test_rate_limiter_creation() {
        let clock = ManualClock::default();
        let limiter = limiter(RateLimitStrategy::TokenBucket, &clock);
        assert_eq!(limiter.strategy(), RateLimitStrategy::TokenBucket);
        assert_eq!(limiter.spec(EndpointClass::Shorten).max_requests, 10);
        assert_eq!(limiter.tracked_keys(EndpointClass::Shorten), 0);
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let mut config = RateLimitConfig::default();
        config.shorten.window = Duration::ZERO;
        assert!(RateLimiter::new(config).is_err());
    }

    #[test]
    fn test_endpoint_classes_have_separate_limits() {
        let clock = ManualClock::default();
        for strategy in [
            RateLimitStrategy::TokenBucket,
            RateLimitStrategy::SlidingWindow,
            RateLimitStrategy::FixedWindow,
        ] {
            let limiter = limiter(strategy, &clock);
            for _ in 0..10 {
                assert!(limiter.check("user123", EndpointClass::Shorten).allowed);
            }
            assert!(!limiter.check("user123", EndpointClass::Shorten).allowed);

            let decision = limiter.check("user123", EndpointClass::Redirect);
            assert!(decision.allowed, "{} redirect should be unaffected", strategy);
            assert_eq!(decision.remaining, 99);
        }
    }

    #[test]
    fn test_per_key_isolation() {
        let clock = ManualClock::at_secs(1_000.0);
        let limiter = limiter(RateLimitStrategy::SlidingWindow, &clock);

        for _ in 0..500 {
            limiter.check("noisy", EndpointClass::Shorten);
        }

        let decision = limiter.check("quiet", EndpointClass::Shorten);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
    }

    #[test]
    fn test_remaining_is_read_only() {
        let clock = ManualClock::default();
        let limiter = limiter(RateLimitStrategy::FixedWindow, &clock);

        assert_eq!(limiter.remaining("alice", EndpointClass::Shorten), 10);
        assert_eq!(limiter.tracked_keys(EndpointClass::Shorten), 0);

        limiter.check("alice", EndpointClass::Shorten);
        for _ in 0..5 {
            assert_eq!(limiter.remaining("alice", EndpointClass::Shorten), 9);
        }
    }

    #[test]
    fn test_reset_single_key_and_all() {
        let clock = ManualClock::default();
        let limiter = limiter(RateLimitStrategy::TokenBucket, &clock);
        for _ in 0..10 {
            limiter.check("alice", EndpointClass::Shorten);
            limiter.check("bob", EndpointClass::Shorten);
        }
        assert!(!limiter.check("alice", EndpointClass::Shorten).allowed);

        assert!(limiter.reset("alice", EndpointClass::Shorten));
        assert!(!limiter.reset("alice", EndpointClass::Redirect));
        assert!(limiter.check("alice", EndpointClass::Shorten).allowed);
        assert!(!limiter.check("bob", EndpointClass::Shorten).allowed);

        limiter.reset_all();
        assert_eq!(limiter.tracked_keys(EndpointClass::Shorten), 0);
        assert!(limiter.check("bob", EndpointClass::Shorten).allowed);
    }

    #[test]
    fn test_token_bucket_refills_with_clock() {
        let clock = ManualClock::default();
        let limiter = limiter(RateLimitStrategy::TokenBucket, &clock);
        for _ in 0..10 {
            limiter.check("alice", EndpointClass::Shorten);
        }
        assert!(!limiter.check("alice", EndpointClass::Shorten).allowed);

        clock.advance(Duration::from_secs(7));
        assert!(limiter.check("alice", EndpointClass::Shorten).allowed);
    }

    #[test]
    fn test_limiter_exposes_state() {
        let clock = ManualClock::at_secs(30.0);
        let spec = LimitSpec::per_minute(10).unwrap();
        let limiter = Limiter::new(
            FixedWindow,
            EndpointClass::Redirect,
            spec,
            Arc::new(clock.clone()),
            None,
        )
        .unwrap();

        assert!(limiter.state("alice").is_none());
        limiter.check("alice");
        limiter.check("alice");
        let state = limiter.state("alice").unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(state.window_start(), Duration::ZERO);
    }

    #[test]
    fn test_max_tracked_keys_bounds_each_class() {
        let clock = ManualClock::default();
        let config = RateLimitConfig {
            max_tracked_keys: Some(3),
            ..RateLimitConfig::default()
        };
        let limiter = RateLimiter::with_clock(config, Arc::new(clock)).unwrap();

        for user in ["a", "b", "c", "d", "e"] {
            limiter.check(user, EndpointClass::Redirect);
        }
        assert_eq!(limiter.tracked_keys(EndpointClass::Redirect), 3);
    }
}
