use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::key::EndpointClass;

/// Maximum requests allowed per window for one endpoint class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitSpec {
    pub max_requests: u32,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl LimitSpec {
    /// Create a limit, rejecting zero requests or an empty window.
    pub fn new(max_requests: u32, window: Duration) -> Result<Self> {
        let spec = Self {
            max_requests,
            window,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn per_minute(max_requests: u32) -> Result<Self> {
        Self::new(max_requests, Duration::from_secs(60))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(Error::Configuration(
                "max_requests must be greater than 0".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(Error::Configuration(
                "window must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Token refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.max_requests as f64 / self.window.as_secs_f64()
    }
}

/// Rate limit strategy enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimitStrategy {
    TokenBucket,
    FixedWindow,
    #[default]
    SlidingWindow,
}

impl RateLimitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitStrategy::TokenBucket => "token-bucket",
            RateLimitStrategy::FixedWindow => "fixed-window",
            RateLimitStrategy::SlidingWindow => "sliding-window",
        }
    }
}

impl std::fmt::Display for RateLimitStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateLimitStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "token-bucket" => Ok(RateLimitStrategy::TokenBucket),
            "fixed-window" => Ok(RateLimitStrategy::FixedWindow),
            "sliding-window" => Ok(RateLimitStrategy::SlidingWindow),
            other => Err(Error::Configuration(format!(
                "unknown rate limit strategy '{}', expected token-bucket, sliding-window or fixed-window",
                other
            ))),
        }
    }
}

/// Limits for every endpoint class plus the algorithm that enforces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    #[serde(default = "default_shorten")]
    pub shorten: LimitSpec,
    #[serde(default = "default_redirect")]
    pub redirect: LimitSpec,
    /// Bound on tracked keys per endpoint class; least recently used keys are
    /// evicted past it. Unbounded when absent.
    #[serde(default)]
    pub max_tracked_keys: Option<usize>,
}

fn default_shorten() -> LimitSpec {
    LimitSpec {
        max_requests: 10,
        window: Duration::from_secs(60),
    }
}

fn default_redirect() -> LimitSpec {
    LimitSpec {
        max_requests: 100,
        window: Duration::from_secs(60),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::default(),
            shorten: default_shorten(),
            redirect: default_redirect(),
            max_tracked_keys: None,
        }
    }
}

impl RateLimitConfig {
    pub fn with_strategy(strategy: RateLimitStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Load limits from a JSON file, e.g.
    /// `{"strategy": "token-bucket", "shorten": {"max_requests": 10, "window": "1m"}}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: RateLimitConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn spec_for(&self, class: EndpointClass) -> &LimitSpec {
        match class {
            EndpointClass::Shorten => &self.shorten,
            EndpointClass::Redirect => &self.redirect,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for class in EndpointClass::ALL {
            self.spec_for(class).validate().map_err(|e| match e {
                Error::Configuration(msg) => {
                    Error::Configuration(format!("{} limit: {}", class, msg))
                }
                other => other,
            })?;
        }
        if self.max_tracked_keys == Some(0) {
            return Err(Error::Configuration(
                "max_tracked_keys must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let config = RateLimitConfig::default();
        assert_eq!(config.strategy, RateLimitStrategy::SlidingWindow);
        assert_eq!(config.spec_for(EndpointClass::Shorten).max_requests, 10);
        assert_eq!(config.spec_for(EndpointClass::Redirect).max_requests, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_limits_fail_fast() {
        assert!(LimitSpec::new(0, Duration::from_secs(60)).is_err());
        assert!(LimitSpec::new(10, Duration::ZERO).is_err());

        let mut config = RateLimitConfig::default();
        config.redirect.max_requests = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redirect"));
    }

    #[test]
    fn test_refill_rate() {
        let spec = LimitSpec::per_minute(10).unwrap();
        assert!((spec.refill_rate() - 10.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "token_bucket".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::TokenBucket
        );
        assert_eq!(
            "Fixed-Window".parse::<RateLimitStrategy>().unwrap(),
            RateLimitStrategy::FixedWindow
        );
        assert!("leaky-bucket".parse::<RateLimitStrategy>().is_err());
    }

    #[test]
    fn test_deserialize_with_humantime_windows() {
        let config: RateLimitConfig = serde_json::from_str(
            r#"{
                "strategy": "fixed-window",
                "shorten": {"max_requests": 5, "window": "30s"},
                "max_tracked_keys": 1000
            }"#,
        )
        .unwrap();

        assert_eq!(config.strategy, RateLimitStrategy::FixedWindow);
        assert_eq!(config.shorten.window, Duration::from_secs(30));
        assert_eq!(config.redirect, default_redirect());
        assert_eq!(config.max_tracked_keys, Some(1000));
    }
}
