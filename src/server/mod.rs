//! HTTP 服务端模块
//!
//! Router assembly and the auth endpoints (`logout`, `refresh`, `me`) plus `/health`.
//! Layer order, outermost first: request id, trace, security headers, CORS, admission,
//! then authentication on protected routes only.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{Request, StatusCode};
use axum::middleware::{from_fn_with_state, map_response_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, info_span};

use crate::auth::{Identity, IssuedToken, RefreshError};
use crate::error::{Rejection, Result};
use crate::middleware::{
    GateState, admission_middleware, apply_response_headers, auth_middleware,
};

pub const LOGOUT_PATH: &str = "/api/v1/auth/logout";
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";
pub const ME_PATH: &str = "/api/v1/auth/me";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

impl From<IssuedToken> for RefreshResponse {
    fn from(issued: IssuedToken) -> Self {
        let expires_in = issued.lifetime_secs();
        Self {
            tokens: TokenPair {
                access_token: issued.token.clone(),
                refresh_token: issued.token,
                expires_in,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Puts `resources` behind the auth gate. The returned router still needs the outer
/// layers from [`build_router`].
pub fn protect(state: &GateState, resources: Router) -> Router {
    resources.route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

/// Full application router: built-in auth endpoints, `/health`, the caller's `public`
/// routes (e.g. login) and its `resources`, which require an [`Identity`]. Everything
/// sits behind admission and the response header policy.
pub fn build_router(state: GateState, public: Router, resources: Router) -> Router {
    let auth_routes = Router::new()
        .route(LOGOUT_PATH, post(logout))
        .route(REFRESH_PATH, post(refresh))
        .route(ME_PATH, get(me))
        .with_state(state.clone());

    let protected = protect(&state, auth_routes.merge(resources));

    Router::new()
        .route(HEALTH_PATH, get(health))
        .with_state(state.clone())
        .merge(public)
        .merge(protected)
        .layer(from_fn_with_state(state.clone(), admission_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(map_response_with_state(
                    state.headers.clone(),
                    apply_response_headers,
                ))
                .layer(state.cors.clone()),
        )
}

/// Binds `addr` and serves until Ctrl-C
pub async fn serve(addr: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Tollgate listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Tollgate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

async fn logout(
    State(state): State<GateState>,
    identity: Identity,
) -> std::result::Result<Response, Rejection> {
    if state.gate.logout(&identity).await? {
        Ok(Json(json!({ "message": "Logged out successfully" })).into_response())
    } else {
        Ok((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Logout failed" })),
        )
            .into_response())
    }
}

async fn refresh(State(state): State<GateState>, identity: Identity) -> Response {
    match state.gate.refresh(&identity).await {
        Ok(issued) => Json(RefreshResponse::from(issued)).into_response(),
        Err(RefreshError::Rejected(rejection)) => rejection.into_response(),
        Err(RefreshError::Token(err)) => {
            error!(error = %err, subject = %identity.subject, "Failed to issue refreshed token");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Token refresh failed" })),
            )
                .into_response()
        }
    }
}

async fn me(identity: Identity) -> Json<MeResponse> {
    Json(MeResponse {
        subject: identity.subject,
        issued_at: identity.issued_at,
        expires_at: identity.expires_at,
    })
}

async fn health(State(state): State<GateState>) -> Response {
    let report = state.health.check().await;
    let status = if report.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
