use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header::AUTHORIZATION;

use super::GateState;
use crate::error::{Rejection, RejectionKind};

/// Runs the auth gate and attaches the verified [`Identity`](crate::auth::Identity)
/// to the request for downstream handlers
pub async fn auth_middleware(
    State(state): State<GateState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Rejection> {
    let header = match req.headers().get(AUTHORIZATION) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| Rejection::new(RejectionKind::MalformedOrTamperedToken))?,
        ),
    };

    let identity = state.gate.authenticate(header).await?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}
