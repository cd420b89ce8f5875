use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{KvStore, StoreError, StoreResult};
use crate::clock::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at_ms.is_none_or(|at| at > now_ms)
    }
}

/// 进程内存储
///
/// A single-instance [`KvStore`] whose expiry follows the injected clock. Suitable for
/// tests and local development; it does not share state across processes.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn deadline(&self, ttl: Duration) -> Option<i64> {
        let now = self.clock.now_millis();
        Some(i64::try_from(ttl.as_millis()).map_or(i64::MAX, |ms| now.saturating_add(ms)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at_ms: self.deadline(ttl),
        };
        self.entries.lock().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> StoreResult<u64> {
        let now = self.clock.now_millis();
        let deadline = self.deadline(ttl);
        let mut entries = self.entries.lock().await;

        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if !e.is_live(now) {
                    e.value = "0".to_string();
                    e.expires_at_ms = deadline;
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at_ms: deadline,
            });

        let current: u64 = entry.value.parse().map_err(|_| StoreError::Corrupt {
            key: key.to_string(),
        })?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at_ms)
            .map(|at| Duration::from_millis((at - now).max(0) as u64)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
