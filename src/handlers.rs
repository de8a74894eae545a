use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use crate::adapter::{admit, apply_rate_limit_headers};
use crate::error::Error;
use crate::key::{resolve_identity, EndpointClass};
use crate::rate_limiter::RateLimiter;
use crate::response::{
    HealthResponse, LimitStatusResponse, RateLimitResponse, ResetResponse, TrackedKeys,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub rate_limiter: RateLimiter,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(rate_limiter: RateLimiter) -> Self {
        Self {
            rate_limiter,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CheckRequest {
    #[serde(default)]
    #[validate(length(max = 128))]
    pub user_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdentityParams {
    pub user_id: Option<String>,
}

/// An empty body checks as anonymous. Any other body must be well-formed JSON,
/// so a caller's identity is never silently dropped.
fn parse_check_request(headers: &HeaderMap, body: &Bytes) -> Result<CheckRequest, Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(CheckRequest::default());
    }

    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|content_type| {
            let mime = content_type.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        });
    if !is_json {
        return Err(Error::Validation(
            "Expected request with `Content-Type: application/json`".to_string(),
        ));
    }

    Json::<CheckRequest>::from_bytes(body)
        .map(|Json(request)| request)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}

/// Consume one request from the caller's quota
pub async fn check_rate_limit(
    State(state): State<AppState>,
    Path(endpoint_class): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let endpoint_class: EndpointClass = endpoint_class.parse()?;
    let request = parse_check_request(&headers, &body)?;
    request
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let identity = resolve_identity(request.user_id.as_deref())?;
    let decision = admit(&state.rate_limiter, Some(&identity), endpoint_class)?;
    let spec = state.rate_limiter.spec(endpoint_class);

    let mut resp = Json(RateLimitResponse::allowed(
        endpoint_class,
        identity,
        spec,
        &decision,
    ))
    .into_response();
    apply_rate_limit_headers(resp.headers_mut(), spec.max_requests, decision.remaining);

    Ok(resp)
}

/// Report remaining quota without consuming any
pub async fn get_rate_limit(
    State(state): State<AppState>,
    Path(endpoint_class): Path<String>,
    Query(params): Query<IdentityParams>,
) -> Result<impl IntoResponse, Error> {
    let endpoint_class: EndpointClass = endpoint_class.parse()?;
    let identity = resolve_identity(params.user_id.as_deref())?;
    let limiter = &state.rate_limiter;
    let spec = limiter.spec(endpoint_class);

    Ok(Json(LimitStatusResponse {
        endpoint_class,
        remaining: limiter.remaining(&identity, endpoint_class),
        identity,
        strategy: limiter.strategy(),
        limit: spec.max_requests,
        window_secs: spec.window.as_secs_f64(),
    }))
}

/// Reset the rate limit for one key
pub async fn delete_rate_limit(
    State(state): State<AppState>,
    Path(endpoint_class): Path<String>,
    Query(params): Query<IdentityParams>,
) -> Result<impl IntoResponse, Error> {
    let endpoint_class: EndpointClass = endpoint_class.parse()?;
    let identity = resolve_identity(params.user_id.as_deref())?;

    let reset = state.rate_limiter.reset(&identity, endpoint_class);
    Ok(Json(ResetResponse::key(endpoint_class, &identity, reset)))
}

/// Reset every rate limit
pub async fn delete_all_rate_limits(State(state): State<AppState>) -> impl IntoResponse {
    state.rate_limiter.reset_all();
    Json(ResetResponse::all())
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let limiter = &state.rate_limiter;
    Json(HealthResponse::healthy(
        state.started_at.elapsed().as_secs(),
        limiter.strategy(),
        TrackedKeys {
            shorten: limiter.tracked_keys(EndpointClass::Shorten),
            redirect: limiter.tracked_keys(EndpointClass::Redirect),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn json_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_empty_body_is_anonymous() {
        let request = parse_check_request(&HeaderMap::new(), &Bytes::new()).unwrap();
        assert_eq!(request.user_id, None);

        let request = parse_check_request(&json_headers(), &Bytes::from_static(b"  \n")).unwrap();
        assert_eq!(request.user_id, None);
    }

    #[test]
    fn test_json_body_carries_identity() {
        let body = Bytes::from_static(br#"{"user_id": "alice"}"#);
        let request = parse_check_request(&json_headers(), &body).unwrap();
        assert_eq!(request.user_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_body_without_json_content_type_is_rejected() {
        let body = Bytes::from_static(br#"{"user_id": "alice"}"#);
        let err = parse_check_request(&HeaderMap::new(), &body).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_malformed_body_is_rejected() {
        for body in [&b"{not json"[..], &br#"{"user_id": 42}"#[..]] {
            let err = parse_check_request(&json_headers(), &Bytes::from_static(body)).unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
    }
}
