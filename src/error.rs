use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::algorithms::retry_after_header;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Unknown endpoint class: {0}")]
    UnknownEndpointClass(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded. Max {limit} requests per {}s.", window.as_secs_f64())]
    RateLimitExceeded {
        retry_after: Duration,
        limit: u32,
        window: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: u16) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code,
            retry_after: None,
        }
    }

    pub fn from_error(err: &Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidIdentity(_) => Self::new("bad_request", &message, 400),
            Error::UnknownEndpointClass(_) => Self::new("not_found", &message, 404),
            Error::Validation(_) => Self::new("validation_error", &message, 422),
            Error::RateLimitExceeded { retry_after, .. } => Self {
                retry_after: Some(retry_after.as_secs_f64()),
                ..Self::new("rate_limit_exceeded", &message, 429)
            },
            Error::Configuration(_) => Self::new("configuration_error", &message, 500),
            Error::Io(_) | Error::Json(_) => Self::new("internal_error", &message, 500),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_error(&self);
        let status =
            StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = (status, Json(body)).into_response();
        if let Error::RateLimitExceeded { retry_after, .. } = self {
            response.headers_mut().insert(
                header::RETRY_AFTER,
                HeaderValue::from(retry_after_header(retry_after)),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_message_names_the_limit() {
        let err = Error::RateLimitExceeded {
            retry_after: Duration::from_secs(6),
            limit: 10,
            window: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded. Max 10 requests per 60s.");
    }

    #[test]
    fn test_rejection_maps_to_429_with_retry_after() {
        let err = Error::RateLimitExceeded {
            retry_after: Duration::from_millis(5_200),
            limit: 10,
            window: Duration::from_secs(60),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "6");
    }

    #[test]
    fn test_error_response_codes() {
        let body = ErrorResponse::from_error(&Error::InvalidIdentity("bad id".into()));
        assert_eq!(body.code, 400);
        let body = ErrorResponse::from_error(&Error::UnknownEndpointClass("upload".into()));
        assert_eq!(body.code, 404);
        assert!(body.retry_after.is_none());
    }
}
