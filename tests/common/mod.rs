//! 测试公共工具
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use tollgate_core::auth::{
    AuthGate, KvStore, MemoryStore, RevocationStore, StoreError, StoreResult, TokenCodec,
};
use tollgate_core::clock::{Clock, ManualClock};

/// Start of a 60 s window, so window arithmetic in assertions stays readable
pub const T0: i64 = 1_700_000_040;

pub const SECRET: &str = "test-signing-secret-with-at-least-32-bytes";
pub const ISSUER: &str = "tollgate-test";
pub const DAY: Duration = Duration::from_secs(86_400);

pub fn secret() -> SecretString {
    SecretString::from(SECRET)
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::at(T0))
}

pub fn memory_store(clock: &Arc<ManualClock>) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_clock(clock.clone()))
}

pub fn codec(clock: &Arc<ManualClock>) -> TokenCodec {
    TokenCodec::with_clock(&secret(), ISSUER, DAY, clock.clone()).expect("codec")
}

pub fn gate(store: Arc<dyn KvStore>, clock: &Arc<ManualClock>) -> AuthGate {
    AuthGate::new(Arc::new(codec(clock)), RevocationStore::new(store))
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// A store whose every operation fails, for fail-secure checks
pub struct FailingStore;

#[async_trait]
impl KvStore for FailingStore {
    async fn set_ex(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
        Err(unavailable())
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(unavailable())
    }

    async fn exists(&self, _key: &str) -> StoreResult<bool> {
        Err(unavailable())
    }

    async fn incr_with_ttl(&self, _key: &str, _ttl: Duration) -> StoreResult<u64> {
        Err(unavailable())
    }

    async fn ttl(&self, _key: &str) -> StoreResult<Option<Duration>> {
        Err(unavailable())
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(unavailable())
    }
}

fn unavailable() -> StoreError {
    StoreError::Timeout(Duration::from_millis(250))
}

/// Type-erased handle to the test clock
pub fn dyn_clock(clock: &Arc<ManualClock>) -> Arc<dyn Clock> {
    clock.clone()
}
