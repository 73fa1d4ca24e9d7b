//! JWT Claims structure
//!
//! Represents the payload of an access token: the identity it was issued
//! for plus the standard JWT claims (RFC 7519).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;
use crate::identity::{Identity, Role};

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (identity ID as UUID string)
    pub sub: String,
    pub username: String,
    pub email: String,
    /// Informational only; authorization must re-read the identity record
    pub role: Role,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Unique token id
    pub jti: String,
}

impl Claims {
    /// Create claims for `identity`, valid from `issued_at` for `expiry_seconds`
    pub fn new(
        identity: &Identity,
        issued_at: DateTime<Utc>,
        expiry_seconds: i64,
        issuer: &str,
        audience: &str,
    ) -> Self {
        let now = issued_at.timestamp();
        Self {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            iat: now,
            exp: now + expiry_seconds,
            iss: issuer.to_string(),
            aud: audience.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Extract the subject's identity ID
    ///
    /// # Errors
    /// `Unauthenticated` if the subject is not a valid UUID
    pub fn subject_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| {
            tracing::warn!("Token subject is not a valid identity id");
            AuthError::Unauthenticated
        })
    }

    /// Expired strictly after `exp`; zero clock-skew tolerance
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() > self.exp
    }
}
