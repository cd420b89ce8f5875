//! 响应头策略
//!
//! Security headers attached to every response, plus the CORS layer.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Response;
use http::header::{
    AUTHORIZATION, CACHE_CONTROL, CONTENT_SECURITY_POLICY, EXPIRES, PRAGMA, REFERRER_POLICY,
    STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::config::Environment;

const CSP: &str = "default-src 'none'; script-src 'none'; style-src 'none'; img-src 'none'; \
font-src 'none'; connect-src 'self'; frame-ancestors 'none'; base-uri 'none'; form-action 'none'";

const PERMISSIONS_POLICY: &str = "accelerometer=(), camera=(), geolocation=(), gyroscope=(), \
magnetometer=(), microphone=(), payment=(), usb=(), interest-cohort=()";

const HSTS: &str = "max-age=31536000; includeSubDomains; preload";

const CORS_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
    Method::HEAD,
];

/// Fixed set of headers written onto every response. Existing values are overwritten.
#[derive(Debug, Clone)]
pub struct ResponseHeaderPolicy {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl ResponseHeaderPolicy {
    pub fn for_environment(environment: Environment) -> Self {
        let mut headers = vec![
            (X_FRAME_OPTIONS, HeaderValue::from_static("DENY")),
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
            (
                REFERRER_POLICY,
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            ),
            (
                CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
            ),
            (PRAGMA, HeaderValue::from_static("no-cache")),
            (EXPIRES, HeaderValue::from_static("0")),
            (CONTENT_SECURITY_POLICY, HeaderValue::from_static(CSP)),
            (
                HeaderName::from_static("permissions-policy"),
                HeaderValue::from_static(PERMISSIONS_POLICY),
            ),
            (
                HeaderName::from_static("x-download-options"),
                HeaderValue::from_static("noopen"),
            ),
            (
                HeaderName::from_static("x-permitted-cross-domain-policies"),
                HeaderValue::from_static("none"),
            ),
        ];
        if environment.is_production() {
            headers.push((STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS)));
        }
        Self { headers }
    }

    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// `map_response_with_state` adapter for [`ResponseHeaderPolicy`]
pub async fn apply_response_headers(
    State(policy): State<Arc<ResponseHeaderPolicy>>,
    mut response: Response,
) -> Response {
    policy.apply(response.headers_mut());
    response
}

/// Production: only the configured origins, with credentials.
/// Development: any `http://localhost[:port]` origin, without credentials.
pub fn cors_layer(environment: Environment, allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(CORS_METHODS)
        .expose_headers([AUTHORIZATION]);

    if environment.is_production() {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| {
                if origin == "*" {
                    warn!("Wildcard CORS origin is not allowed with credentials, ignoring");
                    return None;
                }
                HeaderValue::from_str(origin)
                    .inspect_err(|_| warn!(origin = %origin, "Ignoring invalid CORS origin"))
                    .ok()
            })
            .collect();
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        layer
            .allow_origin(AllowOrigin::predicate(|origin, _| is_localhost_origin(origin)))
            .allow_headers(Any)
    }
}

fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Some(rest) = origin
        .to_str()
        .ok()
        .and_then(|s| s.strip_prefix("http://localhost"))
    else {
        return false;
    };
    match rest.strip_prefix(':') {
        None => rest.is_empty(),
        Some(port) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
    }
}
