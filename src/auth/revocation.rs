//! 令牌撤销存储
//!
//! Individually revoked tokens and wholesale-revoked subjects, kept only in the shared
//! [`KvStore`]. Entries expire through the store's TTL and are never deleted otherwise.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, error};

use super::store::{KvStore, StoreResult};

const TOKEN_PREFIX: &str = "revoked:token";
const SUBJECT_PREFIX: &str = "revoked:subject";

#[derive(Clone)]
pub struct RevocationStore {
    store: Arc<dyn KvStore>,
}

impl RevocationStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Records `token` as revoked for `ttl_secs`.
    ///
    /// Returns `Ok(false)` without touching the store when `ttl_secs <= 0`: the token has
    /// already expired and a revocation entry would add nothing.
    pub async fn revoke_token(&self, token: &str, ttl_secs: i64) -> StoreResult<bool> {
        if ttl_secs <= 0 {
            debug!(ttl_secs, "Skipping revocation of expired token");
            return Ok(false);
        }

        let key = token_key(token);
        self.store
            .set_ex(&key, "1", Duration::from_secs(ttl_secs as u64))
            .await
            .inspect_err(|err| error!(%err, "Failed to record token revocation"))?;
        Ok(true)
    }

    pub async fn is_token_revoked(&self, token: &str) -> StoreResult<bool> {
        self.store
            .exists(&token_key(token))
            .await
            .inspect_err(|err| error!(%err, "Token revocation lookup failed"))
    }

    /// Writes or overwrites the subject-wide revocation
    pub async fn revoke_subject(&self, subject: &str, duration_secs: u64) -> StoreResult<()> {
        self.store
            .set_ex(
                &subject_key(subject),
                "1",
                Duration::from_secs(duration_secs.max(1)),
            )
            .await
            .inspect_err(|err| error!(%err, subject, "Failed to record subject revocation"))
    }

    pub async fn is_subject_revoked(&self, subject: &str) -> StoreResult<bool> {
        self.store
            .exists(&subject_key(subject))
            .await
            .inspect_err(|err| error!(%err, subject, "Subject revocation lookup failed"))
    }

    /// Remaining lifetime of a token's revocation entry
    pub async fn token_revocation_ttl(&self, token: &str) -> StoreResult<Option<Duration>> {
        self.store.ttl(&token_key(token)).await
    }

    pub async fn subject_revocation_ttl(&self, subject: &str) -> StoreResult<Option<Duration>> {
        self.store.ttl(&subject_key(subject)).await
    }
}

fn token_key(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    format!("{TOKEN_PREFIX}:{digest:x}")
}

fn subject_key(subject: &str) -> String {
    format!("{SUBJECT_PREFIX}:{subject}")
}
