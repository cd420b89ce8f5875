use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

/// 共享存储访问失败
///
/// Every variant means the store could not answer. Callers treat it as the
/// StoreUnavailable outcome, never as a negative lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("corrupt value under key {key}")]
    Corrupt { key: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 分布式 TTL 键值存储接口
///
/// The single source of truth for revocations, throttle counters and ban records.
/// Implementations must give per-key read-your-writes to the writing instance and
/// must make [`KvStore::incr_with_ttl`] atomic.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Writes `value` under `key`, replacing any previous entry, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically increments the counter under `key` and returns the new value.
    /// `ttl` is applied only when the increment creates the counter.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64>;

    /// Remaining lifetime of `key`, `None` when it is absent or has no expiry
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Connectivity probe used by the health endpoint
    async fn ping(&self) -> StoreResult<()>;
}
