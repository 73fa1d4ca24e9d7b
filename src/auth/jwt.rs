//! Access token issuance and validation
//!
//! HS256-signed JWTs over a single shared secret. Settings are validated
//! once in [`TokenService::new`]; after that the service holds only
//! immutable state and is safe to share across threads.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::auth::refresh_token::{generate_rotation_token, is_well_formed_rotation_token};
use crate::clock::{Clock, SystemClock};
use crate::configuration::JwtSettings;
use crate::error::AuthError;
use crate::identity::Identity;

pub struct TokenService {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// # Errors
    /// `Configuration` if the secret, issuer, audience, or TTL is missing or invalid
    pub fn new(settings: JwtSettings) -> Result<Self, AuthError> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: JwtSettings, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        settings.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&settings.issuer]);
        validation.set_audience(&[&settings.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        // Expiry is checked against our own clock with zero leeway
        validation.validate_exp = false;
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            settings,
            clock,
        })
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Mint a signed access token for `identity`
    pub fn issue_access_token(&self, identity: &Identity) -> Result<String, AuthError> {
        let claims = Claims::new(
            identity,
            self.clock.now(),
            self.settings.access_token_expiry_seconds(),
            &self.settings.issuer,
            &self.settings.audience,
        );

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Validate an access token and return its subject id
    ///
    /// # Errors
    /// `Unauthenticated` for every failure: blank token, bad signature,
    /// wrong issuer/audience, expired, or unparseable subject
    pub fn validate_access_token(&self, token: &str) -> Result<Uuid, AuthError> {
        self.verify_claims(token)?.subject_id()
    }

    /// Fully validate an access token and return all of its claims
    pub fn verify_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = self.decode_signed(token)?;

        if claims.is_expired_at(self.clock.now()) {
            tracing::info!(user_id = %claims.sub, "Access token expired");
            return Err(AuthError::Unauthenticated);
        }

        Ok(claims)
    }

    /// Recover the subject of a correctly signed token even if it has expired.
    ///
    /// Refresh exists for expired tokens, so expiry is skipped here while
    /// signature, issuer and audience are still enforced.
    pub fn extract_subject_ignoring_expiry(&self, token: &str) -> Result<Uuid, AuthError> {
        self.decode_signed(token)?.subject_id()
    }

    /// A fresh 64-byte rotation token, not bound to anything at issuance
    pub fn issue_rotation_token(&self) -> String {
        generate_rotation_token()
    }

    pub fn validate_rotation_token_shape(&self, token: &str) -> bool {
        is_well_formed_rotation_token(token)
    }

    /// Access token lifetime, for an `expires_in` style response field
    pub fn expires_in_seconds(&self) -> i64 {
        self.settings.access_token_expiry_seconds()
    }

    fn decode_signed(&self, token: &str) -> Result<Claims, AuthError> {
        if token.trim().is_empty() {
            tracing::warn!("Empty access token presented");
            return Err(AuthError::Unauthenticated);
        }

        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::warn!("JWT validation error: {}", e);
                AuthError::Unauthenticated
            })
    }
}
