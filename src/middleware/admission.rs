use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{AUTHORIZATION, CONTENT_TYPE};

use super::GateState;
use crate::admission::RequestFacts;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Client address: the first `X-Forwarded-For` hop when trusted, otherwise the peer
/// address. Unknown peers map to `0.0.0.0` so they never match a loopback safelist.
pub fn client_ip(req: &Request, trust_forwarded_for: bool) -> IpAddr {
    let forwarded = trust_forwarded_for
        .then(|| {
            req.headers()
                .get(X_FORWARDED_FOR)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
        .flatten();

    forwarded
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Rejects throttled, banned and blocked requests before any credential is verified.
/// Admitted responses carry the `X-RateLimit-*` headers of the tightest matching rule.
pub async fn admission_middleware(
    State(state): State<GateState>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req, state.trust_forwarded_for);
    let mut facts = RequestFacts::new(ip, req.method().clone(), req.uri().path());
    if let Some(query) = req.uri().query() {
        facts = facts.with_query(query);
    }
    if let Some(content_type) = req.headers().get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        facts = facts.with_content_type(content_type);
    }
    let authorization = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    // the signature is only checked once the client address is known not to be banned
    let decision = state
        .admission
        .evaluate_with(facts, || state.gate.claimed_subject(authorization.as_deref()))
        .await;

    match decision {
        Ok(admission) => {
            let mut response = next.run(req).await;
            if let Some(info) = admission.rate_limit {
                info.write_headers(response.headers_mut(), false);
            }
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}
