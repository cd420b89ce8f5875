use std::fmt;

use axum::extract::FromRequestParts;
use http::request::Parts;

use crate::error::Rejection;

/// Verified caller identity, attached to the request once the gate accepts it.
///
/// Resource handlers take it as an extractor and never re-verify the credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
    token: String,
}

impl Identity {
    pub(crate) fn new(subject: String, issued_at: i64, expires_at: i64, token: String) -> Self {
        Self {
            subject,
            issued_at,
            expires_at,
            token,
        }
    }

    /// The credential this identity was proven with
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &self.subject)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(Rejection::missing_credential)
    }
}
