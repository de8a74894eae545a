use serde::Serialize;

use crate::algorithms::Decision;
use crate::key::EndpointClass;
use crate::rate_limit_config::{LimitSpec, RateLimitStrategy};

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub allowed: bool,
    pub endpoint_class: EndpointClass,
    pub identity: String,
    pub limit: u32,
    pub remaining: u32,
    pub window_secs: f64,
}

impl RateLimitResponse {
    pub fn allowed(
        endpoint_class: EndpointClass,
        identity: String,
        spec: &LimitSpec,
        decision: &Decision,
    ) -> Self {
        Self {
            allowed: decision.allowed,
            endpoint_class,
            identity,
            limit: spec.max_requests,
            remaining: decision.remaining,
            window_secs: spec.window.as_secs_f64(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LimitStatusResponse {
    pub endpoint_class: EndpointClass,
    pub identity: String,
    pub strategy: RateLimitStrategy,
    pub limit: u32,
    pub remaining: u32,
    pub window_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: String,
    pub message: String,
    pub reset: bool,
}

impl ResetResponse {
    pub fn key(endpoint_class: EndpointClass, identity: &str, reset: bool) -> Self {
        let message = if reset {
            format!("Rate limit for {} on {} reset", identity, endpoint_class)
        } else {
            format!("No rate limit state for {} on {}", identity, endpoint_class)
        };
        Self {
            status: "success".to_string(),
            message,
            reset,
        }
    }

    pub fn all() -> Self {
        Self {
            status: "success".to_string(),
            message: "All rate limits reset".to_string(),
            reset: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TrackedKeys {
    pub shorten: usize,
    pub redirect: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub strategy: RateLimitStrategy,
    pub tracked_keys: TrackedKeys,
}

impl HealthResponse {
    pub fn healthy(uptime_seconds: u64, strategy: RateLimitStrategy, tracked_keys: TrackedKeys) -> Self {
        Self {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds,
            strategy,
            tracked_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_health_response_serialization() {
        let health = HealthResponse::healthy(
            3600,
            RateLimitStrategy::FixedWindow,
            TrackedKeys {
                shorten: 2,
                redirect: 5,
            },
        );

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["strategy"], "fixed-window");
        assert_eq!(json["tracked_keys"]["redirect"], 5);
    }

    #[test]
    fn test_rate_limit_response_serialization() {
        let spec = LimitSpec::new(10, Duration::from_secs(60)).unwrap();
        let response = RateLimitResponse::allowed(
            EndpointClass::Shorten,
            "user123".to_string(),
            &spec,
            &Decision::allow(7),
        );

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["endpoint_class"], "shorten");
        assert_eq!(json["remaining"], 7);
        assert_eq!(json["window_secs"], 60.0);
    }
}
