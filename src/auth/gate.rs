//! 认证闸门
//!
//! Per-request verifier composing [`TokenCodec`] and [`RevocationStore`] into a single
//! accept/reject decision:
//!
//! ```text
//! NoCredential ──▶ Verifying ──▶ Accepted(Identity)
//!       │              │
//!       └──────────────┴──▶ Rejected(kind)
//! ```
//!
//! Store failures during a revocation check reject with `StoreUnavailable`; the gate
//! never assumes "not revoked" when it cannot ask.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::identity::Identity;
use super::revocation::RevocationStore;
use super::token::{IssuedToken, TokenCodec, TokenError};
use crate::error::{Rejection, RejectionKind};

const DEFAULT_SUBJECT_REVOCATION: Duration = Duration::from_secs(86_400);

/// Token rotation failures
#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Token(#[from] TokenError),
}

pub struct AuthGate {
    codec: Arc<TokenCodec>,
    revocations: RevocationStore,
    subject_revocation: Duration,
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, revocations: RevocationStore) -> Self {
        Self {
            codec,
            revocations,
            subject_revocation: DEFAULT_SUBJECT_REVOCATION,
        }
    }

    /// Sets the default lifetime of subject-wide revocations
    #[must_use]
    pub fn with_subject_revocation(mut self, duration: Duration) -> Self {
        self.subject_revocation = duration;
        self
    }

    /// Extracts the credential from an `Authorization` header value
    pub fn bearer_token(header: Option<&str>) -> Option<&str> {
        let value = header?.trim();
        let token = match value.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
            // any other scheme fails signature verification
            Some(_) => value,
            None if value.eq_ignore_ascii_case("bearer") => "",
            None => value,
        };
        (!token.is_empty()).then_some(token)
    }

    /// Runs the full decision for an `Authorization` header value
    pub async fn authenticate(&self, header: Option<&str>) -> Result<Identity, Rejection> {
        let token = Self::bearer_token(header).ok_or_else(Rejection::missing_credential)?;
        self.verify_token(token).await
    }

    /// Signature, expiry, token revocation, then subject revocation
    pub async fn verify_token(&self, token: &str) -> Result<Identity, Rejection> {
        let verified = self.codec.verify(token).map_err(|err| {
            debug!(%err, "Token verification failed");
            Rejection::new(RejectionKind::from(err))
        })?;

        match self.revocations.is_token_revoked(token).await {
            Ok(false) => {}
            Ok(true) => {
                info!(subject = %verified.subject, "Rejected revoked token");
                return Err(Rejection::new(RejectionKind::TokenRevoked));
            }
            Err(_) => return Err(Rejection::store_unavailable()),
        }

        match self.revocations.is_subject_revoked(&verified.subject).await {
            Ok(false) => {}
            Ok(true) => {
                info!(subject = %verified.subject, "Rejected token of revoked subject");
                return Err(Rejection::new(RejectionKind::SubjectRevoked));
            }
            Err(_) => return Err(Rejection::store_unavailable()),
        }

        debug!(subject = %verified.subject, "Request authenticated");
        Ok(Identity::new(
            verified.subject,
            verified.issued_at,
            verified.expires_at,
            token.to_string(),
        ))
    }

    /// Subject named by a well-signed, unexpired credential, without any store lookup.
    ///
    /// Used by admission control to scope per-subject rules; it is not an authentication
    /// decision.
    pub fn claimed_subject(&self, header: Option<&str>) -> Option<String> {
        let token = Self::bearer_token(header)?;
        self.codec.verify(token).ok().map(|verified| verified.subject)
    }

    /// Issues a token for a subject whose credentials were checked elsewhere
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.codec.issue_default(subject)
    }

    /// Revokes the presented token for the rest of its validity.
    ///
    /// Returns `false` if the token had already expired and nothing was written.
    pub async fn logout(&self, identity: &Identity) -> Result<bool, Rejection> {
        let ttl = identity.expires_at - self.now();
        let written = self
            .revocations
            .revoke_token(identity.token(), ttl)
            .await
            .map_err(|_| Rejection::store_unavailable())?;
        info!(subject = %identity.subject, ttl_secs = ttl, "Token revoked on logout");
        Ok(written)
    }

    /// Revokes the presented token, then issues a replacement.
    ///
    /// The new token is only handed out after the revocation write succeeded. Other
    /// instances may still accept the old token until the write propagates to them.
    /// The replacement is stamped at least one second after the old `iat`, otherwise a
    /// refresh within the same second would reproduce the token it just revoked.
    pub async fn refresh(&self, identity: &Identity) -> Result<IssuedToken, RefreshError> {
        self.logout(identity).await?;
        let issued_at = self.now().max(identity.issued_at + 1);
        let issued = self.codec.issue_at(
            &identity.subject,
            issued_at,
            self.codec.default_lifetime(),
        )?;
        info!(subject = %identity.subject, expires_at = issued.expires_at, "Token rotated");
        Ok(issued)
    }

    /// Invalidates every outstanding token of `subject` for `duration`
    /// (defaults to the configured subject revocation period)
    pub async fn revoke_subject(
        &self,
        subject: &str,
        duration: Option<Duration>,
    ) -> Result<(), Rejection> {
        let duration = duration.unwrap_or(self.subject_revocation);
        self.revocations
            .revoke_subject(subject, duration.as_secs())
            .await
            .map_err(|_| Rejection::store_unavailable())?;
        warn!(subject, duration_secs = duration.as_secs(), "Subject revoked");
        Ok(())
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn revocations(&self) -> &RevocationStore {
        &self.revocations
    }

    fn now(&self) -> i64 {
        self.codec.clock().unix_timestamp()
    }
}
