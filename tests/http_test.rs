//! HTTP 路由集成测试

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use axum::routing::{get, post};
use serde_json::Value;
use tower::ServiceExt;

use tollgate_core::auth::{Identity, KvStore};
use tollgate_core::config::GateConfig;
use tollgate_core::middleware::GateState;
use tollgate_core::server::build_router;

use common::{FailingStore, SECRET, T0, bearer, clock, memory_store};

fn config(extra: &[(&str, &str)]) -> GateConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("TOLLGATE_SIGNING_SECRET".to_string(), SECRET.to_string()),
        ("TOLLGATE_TRUST_FORWARDED_FOR".to_string(), "true".to_string()),
    ]);
    for (key, value) in extra {
        vars.insert(key.to_string(), value.to_string());
    }
    GateConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn app_with(store: Arc<dyn KvStore>, config: &GateConfig) -> (Router, GateState) {
    let clock = clock();
    let state = GateState::from_config(config, store, clock).unwrap();

    let public = Router::new().route("/api/v1/auth/login", post(|| async { "welcome" }));
    let resources =
        Router::new().route("/api/v1/foods", get(|identity: Identity| async move { identity.subject }));

    (build_router(state.clone(), public, resources), state)
}

fn app() -> (Router, GateState) {
    let clock = clock();
    app_with(memory_store(&clock), &config(&[]))
}

fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "1.2.3.4")
}

async fn json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn missing_credential_is_401_with_security_headers() {
    let (app, _) = app();

    let response = app
        .oneshot(request("GET", "/api/v1/foods").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
    assert!(!response.headers().contains_key("strict-transport-security"));

    let body = json(response).await;
    assert_eq!(body["error"], "MISSING_CREDENTIAL");
    assert_eq!(body["message"], "Missing authorization token");
}

#[tokio::test]
async fn valid_token_reaches_resource_with_identity() {
    let (app, state) = app();
    let token = state.gate.issue("U1").unwrap().token;

    let response = app
        .oneshot(
            request("GET", "/api/v1/foods")
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "1000");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "999");
    assert!(!response.headers().contains_key(header::RETRY_AFTER));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"U1");
}

#[tokio::test]
async fn tampered_token_is_401() {
    let (app, _) = app();

    let response = app
        .oneshot(
            request("GET", "/api/v1/auth/me")
                .header(header::AUTHORIZATION, "Bearer abc.def.ghi")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["error"], "MALFORMED_OR_TAMPERED_TOKEN");
}

#[tokio::test]
async fn logout_revokes_the_presented_token() {
    let (app, state) = app();
    let token = state.gate.issue("U1").unwrap().token;

    let response = app
        .clone()
        .oneshot(
            request("POST", "/api/v1/auth/logout")
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["message"], "Logged out successfully");

    let response = app
        .oneshot(
            request("GET", "/api/v1/auth/me")
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["error"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn refresh_returns_new_token_pair() {
    let (app, state) = app();
    let token = state.gate.issue("U1").unwrap().token;

    let response = app
        .clone()
        .oneshot(
            request("POST", "/api/v1/auth/refresh")
                .header(header::AUTHORIZATION, bearer(&token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json(response).await;
    assert_eq!(body["tokens"]["expiresIn"], 86_400);
    let fresh = body["tokens"]["accessToken"].as_str().unwrap().to_string();
    assert_eq!(body["tokens"]["refreshToken"], fresh.as_str());

    let response = app
        .oneshot(
            request("GET", "/api/v1/auth/me")
                .header(header::AUTHORIZATION, bearer(&fresh))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = json(response).await;
    assert_eq!(me["subject"], "U1");
    // refreshed within the same second, so stamped one second later
    assert_eq!(me["issuedAt"], T0 + 1);
    assert_eq!(me["expiresAt"], T0 + 1 + 86_400);

    let identity = state.gate.verify_token(&token).await;
    assert!(identity.is_err());
}

#[tokio::test]
async fn sixth_login_is_throttled_with_headers() {
    let (app, _) = app();

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(request("POST", "/api/v1/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(request("POST", "/api/v1/auth/login").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let headers = response.headers();
    assert_eq!(headers["x-ratelimit-limit"], "5");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert_eq!(headers["x-ratelimit-reset"], (T0 + 60).to_string().as_str());
    assert_eq!(headers[header::RETRY_AFTER], "60");
    assert_eq!(headers["x-frame-options"], "DENY");

    let body = json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
    assert_eq!(body["retryAfter"], T0 + 60);
}

#[tokio::test]
async fn suspicious_query_is_forbidden() {
    let (app, _) = app();

    let response = app
        .oneshot(
            request("GET", "/api/v1/foods?q=1%20union%20select%20*%20from%20users")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = json(response).await;
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(body["message"], "Your request has been blocked");
}

#[tokio::test]
async fn health_reflects_store_reachability() {
    let (app, _) = app();
    let response = app
        .oneshot(request("GET", "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["status"], "serving");

    let (app, _) = app_with(Arc::new(FailingStore), &config(&[("TOLLGATE_BAN_MAX_VIOLATIONS", "0")]));
    let response = app
        .oneshot(request("GET", "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(response).await["components"]["store"], "not_serving");
}

#[tokio::test]
async fn store_outage_rejects_instead_of_admitting() {
    let (app, _) = app_with(Arc::new(FailingStore), &config(&[]));

    let response = app
        .oneshot(request("GET", "/api/v1/foods").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["error"], "STORE_UNAVAILABLE");
}

#[tokio::test]
async fn production_adds_hsts() {
    let clock = clock();
    let (app, _) = app_with(memory_store(&clock), &config(&[("TOLLGATE_ENV", "production")]));

    let response = app
        .oneshot(request("GET", "/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(
        response.headers()["strict-transport-security"],
        "max-age=31536000; includeSubDomains; preload"
    );
}

#[tokio::test]
async fn development_cors_allows_localhost() {
    let (app, _) = app();

    let response = app
        .oneshot(
            request("OPTIONS", "/api/v1/foods")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
    // preflight answers are security-hardened like any other response
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn banned_client_sees_violation_threshold() {
    let (app, _) = app();

    for _ in 0..10 {
        app.clone()
            .oneshot(request("POST", "/api/v1/auth/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
    }

    let response = app
        .oneshot(request("GET", "/api/v1/foods").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()[header::RETRY_AFTER], "86400");
    assert_eq!(json(response).await["error"], "Rate limit exceeded");
}
