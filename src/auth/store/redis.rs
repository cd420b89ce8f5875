use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use super::{KvStore, StoreError, StoreResult};

const DEFAULT_NAMESPACE: &str = "tollgate";
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_millis(250);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// INCR, then set the expiry only if this call created the key
const INCR_WITH_TTL_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
if count == 1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
"#;

/// Redis 存储实现
///
/// Keys are prefixed with the namespace. Every command is bounded by `op_timeout`;
/// on expiry the call fails with [`StoreError::Timeout`] and is not retried.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
    op_timeout: Duration,
    incr_script: redis::Script,
}

impl RedisStore {
    pub async fn connect(url: impl AsRef<str>) -> StoreResult<Self> {
        Self::connect_with(url, DEFAULT_NAMESPACE, DEFAULT_OP_TIMEOUT).await
    }

    pub async fn connect_with(
        url: impl AsRef<str>,
        namespace: impl Into<String>,
        op_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = redis::Client::open(url.as_ref())
            .map_err(|err| StoreError::Connection(format!("failed to open redis client: {err}")))?;

        let conn = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(CONNECT_TIMEOUT))?
            .map_err(|err| StoreError::Connection(format!("failed to connect to redis: {err}")))?;

        let namespace = namespace.into();
        info!(namespace = %namespace, timeout_ms = op_timeout.as_millis() as u64, "Redis store connected");

        Ok(Self {
            conn,
            namespace,
            op_timeout,
            incr_script: redis::Script::new(INCR_WITH_TTL_SCRIPT),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    async fn bounded<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.op_timeout)),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout()
            || err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let key = self.key(key);
        let ttl_secs = ttl.as_secs().max(1);
        let mut conn = self.conn.clone();
        self.bounded(conn.set_ex::<_, _, ()>(key, value, ttl_secs)).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.bounded(conn.get::<_, Option<String>>(key)).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        self.bounded(conn.exists::<_, bool>(key)).await
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let key = self.key(key);
        let ttl_ms = ttl.as_millis().max(1) as u64;
        let mut conn = self.conn.clone();
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl_ms);
        let count: u64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let key = self.key(key);
        let mut conn = self.conn.clone();
        // -2: missing, -1: no expiry
        let millis: i64 = self.bounded(conn.pttl::<_, i64>(key)).await?;
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self.bounded(redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}
