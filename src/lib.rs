//! Tollgate Core Library
//!
//! Request admission and identity verification for HTTP services: signed bearer tokens,
//! distributed revocation, and rate limiting with ban escalation, backed by a shared
//! key-value store.

pub mod admission;
pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod server;
pub mod telemetry;

// Re-exports
pub use admission::{
    AccessFilter, Admission, AdmissionController, AdmissionOutcome, BanPolicy, Discriminator,
    RequestFacts, RuleSet, Scope, ThrottleRule,
};
pub use auth::{
    AuthGate, Identity, IssuedToken, KvStore, MemoryStore, RedisStore, RevocationStore,
    StoreError, TokenClaims, TokenCodec, VerificationError, VerifiedToken,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{ConfigError, Environment, GateConfig};
pub use error::{GateError, RateLimitInfo, Rejection, RejectionKind, Result};
pub use health::{HealthReport, HealthService, HealthStatus};
pub use middleware::{GateState, ResponseHeaderPolicy};
pub use server::{build_router, protect, serve};
