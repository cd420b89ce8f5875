//! 拒绝响应结构
//!
//! [`Rejection`] is the value the gate hands back instead of forwarding a request. It
//! renders itself as the HTTP response described by its [`RejectionKind`].

use super::code::{RejectionCategory, RejectionKind};
use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::fmt;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate-limit figures reported to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch second at which the window (or ban) ends
    pub reset_at: i64,
    /// Seconds until `reset_at`
    pub retry_after: i64,
}

impl RateLimitInfo {
    /// Writes the `X-RateLimit-*` headers, plus `Retry-After` when `with_retry` is set
    pub fn write_headers(&self, headers: &mut HeaderMap, with_retry: bool) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
        if with_retry {
            headers.insert(
                http::header::RETRY_AFTER,
                HeaderValue::from(self.retry_after.max(0)),
            );
        }
    }
}

/// A terminal, locally classified rejection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
    /// Name of the admission rule that triggered the rejection
    pub rule: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
}

impl Rejection {
    pub fn new(kind: RejectionKind) -> Self {
        Self {
            kind,
            message: kind.default_message().to_string(),
            rule: None,
            rate_limit: None,
        }
    }

    pub fn missing_credential() -> Self {
        Self::new(RejectionKind::MissingCredential)
    }

    pub fn store_unavailable() -> Self {
        Self::new(RejectionKind::StoreUnavailable)
    }

    pub fn blocked() -> Self {
        Self::new(RejectionKind::Blocked)
    }

    pub fn throttled(rule: impl Into<String>, info: RateLimitInfo) -> Self {
        Self {
            rule: Some(rule.into()),
            rate_limit: Some(info),
            ..Self::new(RejectionKind::Throttled)
        }
    }

    pub fn banned(rule: impl Into<String>, info: RateLimitInfo) -> Self {
        Self {
            rule: Some(rule.into()),
            rate_limit: Some(info),
            ..Self::new(RejectionKind::Banned)
        }
    }

    pub fn category(&self) -> RejectionCategory {
        self.kind.category()
    }
}

impl From<RejectionKind> for Rejection {
    fn from(kind: RejectionKind) -> Self {
        Rejection::new(kind)
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for Rejection {}

#[derive(Serialize)]
struct RejectionBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    retry_after: Option<i64>,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let rate_limit = self.rate_limit.filter(|_| self.kind.is_rate_limited());
        let body = RejectionBody {
            error: self.kind.label(),
            message: &self.message,
            retry_after: rate_limit.map(|info| info.reset_at),
        };

        let mut response = (self.kind.status(), Json(body)).into_response();
        if let Some(info) = rate_limit {
            info.write_headers(response.headers_mut(), true);
        }
        response
    }
}
