//! 拒绝类型与类别定义
//!
//! Every terminal outcome of the gate maps to exactly one [`RejectionKind`], which in
//! turn maps to one HTTP status, one `error` label and one default message.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of rejection outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    // ============================================================
    // 认证相关
    // ============================================================
    MissingCredential,
    MalformedOrTamperedToken,
    Expired,
    TokenRevoked,
    SubjectRevoked,
    StoreUnavailable,

    // ============================================================
    // 准入控制相关
    // ============================================================
    Throttled,
    Banned,
    Blocked,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl RejectionKind {
    /// Stable identifier of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::MissingCredential => "MISSING_CREDENTIAL",
            RejectionKind::MalformedOrTamperedToken => "MALFORMED_OR_TAMPERED_TOKEN",
            RejectionKind::Expired => "EXPIRED",
            RejectionKind::TokenRevoked => "TOKEN_REVOKED",
            RejectionKind::SubjectRevoked => "SUBJECT_REVOKED",
            RejectionKind::StoreUnavailable => "STORE_UNAVAILABLE",
            RejectionKind::Throttled => "THROTTLED",
            RejectionKind::Banned => "BANNED",
            RejectionKind::Blocked => "BLOCKED",
        }
    }

    /// HTTP status carried by the rejection response
    pub fn status(&self) -> StatusCode {
        match self {
            RejectionKind::MissingCredential
            | RejectionKind::MalformedOrTamperedToken
            | RejectionKind::Expired
            | RejectionKind::TokenRevoked
            | RejectionKind::SubjectRevoked
            | RejectionKind::StoreUnavailable => StatusCode::UNAUTHORIZED,
            RejectionKind::Throttled => StatusCode::TOO_MANY_REQUESTS,
            RejectionKind::Banned | RejectionKind::Blocked => StatusCode::FORBIDDEN,
        }
    }

    /// Value of the `error` field in the response body
    pub fn label(&self) -> &'static str {
        match self {
            RejectionKind::Throttled | RejectionKind::Banned => "Rate limit exceeded",
            RejectionKind::Blocked => "Forbidden",
            other => other.as_str(),
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            RejectionKind::MissingCredential => "Missing authorization token",
            RejectionKind::MalformedOrTamperedToken => "Invalid token",
            RejectionKind::Expired => "Token has expired",
            RejectionKind::TokenRevoked => "Token has been revoked",
            RejectionKind::SubjectRevoked => "User access has been revoked",
            RejectionKind::StoreUnavailable => "Unable to verify credential at this time",
            RejectionKind::Throttled => "Too many requests. Please try again later.",
            RejectionKind::Banned => "Too many rate limit violations. Access is temporarily suspended.",
            RejectionKind::Blocked => "Your request has been blocked",
        }
    }

    pub fn category(&self) -> RejectionCategory {
        match self {
            RejectionKind::Throttled | RejectionKind::Banned | RejectionKind::Blocked => {
                RejectionCategory::Admission
            }
            _ => RejectionCategory::Authentication,
        }
    }

    /// Whether the response carries rate-limit headers
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RejectionKind::Throttled | RejectionKind::Banned)
    }
}

/// 拒绝类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCategory {
    Authentication,
    Admission,
}

impl fmt::Display for RejectionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionCategory::Authentication => write!(f, "AUTHENTICATION"),
            RejectionCategory::Admission => write!(f, "ADMISSION"),
        }
    }
}
