//! Rate limit keys: who is asking, and for which kind of endpoint.

use crate::error::Error;
use axum::http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Identity used when a request carries no user id.
pub const ANONYMOUS: &str = "anonymous";

static IDENTITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@._-]{1,128}$").expect("identity pattern is valid"));

/// Paths served by the shortener that are never treated as short codes.
const RESERVED_SEGMENTS: &[&str] = &["health", "stats", "shorten", "check", "limits"];

/// Endpoint classes that carry independent limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
    /// Creating a short link.
    Shorten,
    /// Following a short link.
    Redirect,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 2] = [EndpointClass::Shorten, EndpointClass::Redirect];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::Shorten => "shorten",
            EndpointClass::Redirect => "redirect",
        }
    }

    /// Map a route to its endpoint class. `None` means the route is not limited.
    pub fn classify(method: &Method, path: &str) -> Option<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() || trimmed.contains('/') {
            return None;
        }

        if *method == Method::POST && trimmed == "shorten" {
            return Some(EndpointClass::Shorten);
        }

        if *method == Method::GET && !RESERVED_SEGMENTS.contains(&trimmed) {
            return Some(EndpointClass::Redirect);
        }

        None
    }
}

impl fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shorten" => Ok(EndpointClass::Shorten),
            "redirect" => Ok(EndpointClass::Redirect),
            other => Err(Error::UnknownEndpointClass(other.to_string())),
        }
    }
}

/// Resolve the identity a request is limited under.
///
/// Missing or blank ids fall back to [`ANONYMOUS`]; anything outside
/// `[A-Za-z0-9@._-]{1,128}` is rejected.
pub fn resolve_identity(raw: Option<&str>) -> Result<String, Error> {
    let identity = match raw.map(str::trim) {
        None | Some("") => return Ok(ANONYMOUS.to_string()),
        Some(identity) => identity,
    };

    if !IDENTITY_PATTERN.is_match(identity) {
        return Err(Error::InvalidIdentity(format!(
            "'{}' must be 1-128 characters of letters, digits, '@', '.', '_' or '-'",
            identity
        )));
    }

    Ok(identity.to_string())
}

/// Composite key identifying one independent counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub identity: String,
    pub endpoint_class: EndpointClass,
}

impl RateLimitKey {
    pub fn new(identity: impl Into<String>, endpoint_class: EndpointClass) -> Self {
        Self {
            identity: identity.into(),
            endpoint_class,
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.endpoint_class, self.identity)
    }
}
