use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::error::RejectionKind;

/// JWT claims carried by access tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

/// Result of a successful signature and expiry check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl VerifiedToken {
    /// Seconds of validity left at `now`, zero or negative once expired
    pub fn remaining_secs(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

/// A freshly signed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

impl IssuedToken {
    pub fn lifetime_secs(&self) -> i64 {
        self.expires_at - self.issued_at
    }
}

/// Why a token failed verification
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationError {
    #[error("token is malformed or its signature does not match")]
    MalformedOrTampered,

    #[error("token has expired")]
    Expired,
}

impl From<VerificationError> for RejectionKind {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::MalformedOrTampered => RejectionKind::MalformedOrTamperedToken,
            VerificationError::Expired => RejectionKind::Expired,
        }
    }
}

/// Token signing failures
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("token lifetime of {0:?} is out of range")]
    LifetimeOutOfRange(Duration),

    #[error("failed to encode token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),
}

/// Stateless token codec backed by HMAC (HS256)
///
/// The secret is handed in once at construction and never changes. Verification is a
/// pure function of the token, the secret and the clock; revocation is not checked here.
pub struct TokenCodec {
    issuer: String,
    default_lifetime: Duration,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenCodec {
    /// Creates a new codec
    pub fn new(
        secret: &SecretString,
        issuer: impl Into<String>,
        default_lifetime: Duration,
    ) -> Result<Self, TokenError> {
        Self::with_clock(secret, issuer, default_lifetime, Arc::new(SystemClock))
    }

    pub fn with_clock(
        secret: &SecretString,
        issuer: impl Into<String>,
        default_lifetime: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        let raw = secret.expose_secret();
        if raw.is_empty() {
            return Err(TokenError::EmptySecret);
        }
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iat", "sub", "iss"]);
        // expiry is checked against the injected clock below
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            issuer,
            default_lifetime,
            encoding_key: EncodingKey::from_secret(raw.as_bytes()),
            decoding_key: DecodingKey::from_secret(raw.as_bytes()),
            validation,
            clock,
        })
    }

    /// Issues a token for `subject` valid for `lifetime` from now
    pub fn issue(&self, subject: &str, lifetime: Duration) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, self.clock.unix_timestamp(), lifetime)
    }

    /// Issues a token stamped with an explicit `iat`. Identical inputs give an identical token.
    pub fn issue_at(
        &self,
        subject: &str,
        iat: i64,
        lifetime: Duration,
    ) -> Result<IssuedToken, TokenError> {
        let exp = i64::try_from(lifetime.as_secs())
            .ok()
            .and_then(|secs| iat.checked_add(secs))
            .ok_or(TokenError::LifetimeOutOfRange(lifetime))?;

        let claims = TokenClaims {
            sub: subject.to_string(),
            iss: self.issuer.clone(),
            iat,
            exp,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        Ok(IssuedToken {
            token,
            subject: claims.sub,
            issued_at: iat,
            expires_at: exp,
        })
    }

    /// Issues a token with the configured default lifetime
    pub fn issue_default(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.issue(subject, self.default_lifetime)
    }

    /// Checks signature integrity first, then expiry
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, VerificationError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|_| VerificationError::MalformedOrTampered)?;

        if claims.sub.is_empty() {
            return Err(VerificationError::MalformedOrTampered);
        }
        if claims.exp <= self.clock.unix_timestamp() {
            return Err(VerificationError::Expired);
        }

        Ok(VerifiedToken {
            subject: claims.sub,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
