//! HTTP 中间件模块
//!
//! Wires the gate into axum in request order: admission, authentication, then the
//! response header policy on the way out.

pub mod admission;
pub mod auth;
pub mod headers;

pub use admission::{admission_middleware, client_ip};
pub use auth::auth_middleware;
pub use headers::{ResponseHeaderPolicy, apply_response_headers, cors_layer};

use std::sync::Arc;

use tower_http::cors::CorsLayer;

use crate::admission::AdmissionController;
use crate::auth::{AuthGate, KvStore, RevocationStore, TokenCodec};
use crate::clock::SharedClock;
use crate::config::GateConfig;
use crate::error::Result;
use crate::health::HealthService;

/// Shared per-process state handed to every middleware and handler
#[derive(Clone)]
pub struct GateState {
    pub gate: Arc<AuthGate>,
    pub admission: Arc<AdmissionController>,
    pub health: Arc<HealthService>,
    pub headers: Arc<ResponseHeaderPolicy>,
    pub cors: CorsLayer,
    pub trust_forwarded_for: bool,
}

impl GateState {
    /// Builds every component from the startup configuration around one shared store
    pub fn from_config(
        config: &GateConfig,
        store: Arc<dyn KvStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        let codec = TokenCodec::with_clock(
            &config.signing_secret,
            config.issuer.clone(),
            config.token_lifetime,
            clock.clone(),
        )?;
        let gate = AuthGate::new(Arc::new(codec), RevocationStore::new(store.clone()))
            .with_subject_revocation(config.subject_revocation);
        let admission = AdmissionController::new(store.clone(), config.rules.clone(), clock)
            .with_filter(config.access_filter());

        Ok(Self {
            gate: Arc::new(gate),
            admission: Arc::new(admission),
            health: Arc::new(HealthService::new(store)),
            headers: Arc::new(ResponseHeaderPolicy::for_environment(config.environment)),
            cors: cors_layer(config.environment, &config.server.allowed_origins),
            trust_forwarded_for: config.server.trust_forwarded_for,
        })
    }
}
