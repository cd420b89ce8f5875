//! Tollgate 错误处理模块
//!
//! Two layers of errors live here:
//! - [`Rejection`] / [`RejectionKind`]: the closed set of request outcomes returned to
//!   clients. They are values, never panics or propagated faults.
//! - [`GateError`]: startup and wiring failures (configuration, store connection).

pub mod code;
pub mod rejection;

pub use code::{RejectionCategory, RejectionKind};
pub use rejection::{RateLimitInfo, Rejection};

use crate::auth::store::StoreError;
use crate::auth::token::TokenError;
use crate::config::ConfigError;
use thiserror::Error;

/// Startup / wiring failures
#[derive(Error, Debug)]
pub enum GateError {
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    #[error("令牌错误: {0}")]
    Token(#[from] TokenError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GateError>;
