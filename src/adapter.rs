//! Glue between request handling and the rate limiter.
//!
//! [`admit`] is a plain function over `(identity, endpoint class)` so it can be
//! called from any web stack. [`rate_limit_middleware`] wraps it for axum
//! routers that serve the shortener routes.

use axum::{
    body::{to_bytes, Body},
    extract::{Query, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use serde::Deserialize;
use tracing::warn;

use crate::algorithms::Decision;
use crate::error::{Error, Result};
use crate::key::{resolve_identity, EndpointClass};
use crate::rate_limiter::RateLimiter;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Admit or reject one request.
///
/// A missing identity is limited as `anonymous`; a malformed one is rejected
/// before the limiter is consulted. A rejected check comes back as
/// [`Error::RateLimitExceeded`] carrying the retry hint.
pub fn admit(
    limiter: &RateLimiter,
    identity: Option<&str>,
    endpoint_class: EndpointClass,
) -> Result<Decision> {
    let identity = resolve_identity(identity)?;
    let decision = limiter.check(&identity, endpoint_class);

    if decision.allowed {
        return Ok(decision);
    }

    let spec = limiter.spec(endpoint_class);
    Err(Error::RateLimitExceeded {
        retry_after: decision.retry_after,
        limit: spec.max_requests,
        window: spec.window,
    })
}

/// Write the standard rate limit headers for an admitted request.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
}

/// Largest shorten body buffered to look for a `user_id`.
pub const MAX_IDENTITY_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct IdentityQuery {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdentityBody {
    user_id: Option<String>,
}

fn header_identity(request: &Request) -> Option<String> {
    request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn query_identity(request: &Request) -> Option<String> {
    Query::<IdentityQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.user_id)
}

/// Identity from the `x-user-id` header, falling back to the `user_id` query parameter.
pub fn extract_identity(request: &Request) -> Option<String> {
    header_identity(request).or_else(|| query_identity(request))
}

/// Buffer the body and read an optional JSON `user_id` from it. The returned
/// request carries the same bytes for the downstream handler.
pub async fn extract_body_identity(request: Request) -> Result<(Request, Option<String>)> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_IDENTITY_BODY_BYTES)
        .await
        .map_err(|e| Error::Validation(format!("Unreadable request body: {}", e)))?;

    let identity = serde_json::from_slice::<IdentityBody>(&bytes)
        .ok()
        .and_then(|body| body.user_id);

    Ok((Request::from_parts(parts, Body::from(bytes)), identity))
}

/// Rate limit shortener routes; other routes pass straight through.
///
/// Identity comes from the `x-user-id` header, then the JSON body's `user_id`
/// on `POST /shorten`, then the `user_id` query parameter.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let Some(endpoint_class) = EndpointClass::classify(request.method(), request.uri().path())
    else {
        return next.run(request).await;
    };

    let mut identity = header_identity(&request);
    let request = if identity.is_none() && endpoint_class == EndpointClass::Shorten {
        match extract_body_identity(request).await {
            Ok((request, from_body)) => {
                identity = from_body;
                request
            }
            Err(err) => return err.into_response(),
        }
    } else {
        request
    };
    let identity = identity.or_else(|| query_identity(&request));

    match admit(&limiter, identity.as_deref(), endpoint_class) {
        Ok(decision) => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(
                response.headers_mut(),
                limiter.spec(endpoint_class).max_requests,
                decision.remaining,
            );
            response
        }
        Err(err) => {
            warn!(
                target: "linkguard::adapter",
                endpoint_class = %endpoint_class,
                identity = identity.as_deref().unwrap_or(crate::key::ANONYMOUS),
                error = %err,
                "Request rejected"
            );
            err.into_response()
        }
    }
}

/// Put `router` behind the rate limiter.
pub fn with_rate_limiting<S>(router: Router<S>, limiter: RateLimiter) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
}
