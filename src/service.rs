//! Credential Service
//!
//! Register, login, refresh and current-user validation, composed from the
//! hasher, the token service, and the store collaborators. This is the only
//! layer that raises `Conflict`.

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::auth::{
    burn_verification, hash_password_with_cost, hash_token, verify_password_or_burn,
    RefreshTokenRecord, TokenService,
};
use crate::configuration::{HashingSettings, RotationPolicy, Settings};
use crate::error::{AuthError, ErrorContext, StoreError};
use crate::identity::{Identity, NewIdentity, Role, UserView};
use crate::store::{IdentityStore, RefreshTokenStore};
use crate::validators::{validate_email, validate_password_policy, validate_username};

/// User registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    /// Defaults to `Role::StandardUser`
    #[serde(default)]
    pub role: Option<Role>,
}

/// User login request; an identifier containing `@` is treated as an email
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub access_token: String,
    pub refresh_token: String,
}

/// Returned by register, login and refresh
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in_seconds: i64,
    pub user: UserView,
}

pub struct CredentialService {
    tokens: TokenService,
    hashing: HashingSettings,
    /// Hashed at `hashing.cost` so a missing identity costs the same as a wrong password
    decoy_hash: Arc<str>,
    identities: Arc<dyn IdentityStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl CredentialService {
    /// Runs one bcrypt hash at the configured cost to build the login decoy
    pub fn new(
        tokens: TokenService,
        hashing: HashingSettings,
        identities: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, AuthError> {
        hashing.validate()?;
        let decoy_hash = crate::auth::dummy_hash(hashing.cost)?;

        Ok(Self {
            tokens,
            hashing,
            decoy_hash: Arc::from(decoy_hash),
            identities,
            refresh_tokens,
        })
    }

    /// Build everything from loaded settings with the system clock
    pub fn from_settings(
        settings: &Settings,
        identities: Arc<dyn IdentityStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Result<Self, AuthError> {
        let tokens = TokenService::new(settings.jwt.clone())?;
        Self::new(tokens, settings.hashing.clone(), identities, refresh_tokens)
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an identity and return a fresh token pair
    ///
    /// # Errors
    /// - `InvalidInput`: missing or malformed username/email/password
    /// - `Conflict`: email or username already in use (email reported first)
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let context = ErrorContext::new("register");

        let (username, email) = match validate_registration(&request) {
            Ok(normalized) => normalized,
            Err(e) => {
                context.log_error(&e, "registration input rejected");
                return Err(e);
            }
        };

        // Both checks always run against the store; email is reported first
        let email_taken = self.identities.find_by_email(&email).await?.is_some();
        let username_taken = self.identities.find_by_username(&username).await?.is_some();

        if email_taken || username_taken {
            let err = if email_taken {
                AuthError::Conflict("email is already in use".to_string())
            } else {
                AuthError::Conflict("username is already in use".to_string())
            };
            context.log_error(&err, "identity already exists");
            return Err(err);
        }

        let password_hash = self.hash(request.password).await?;

        let identity = self
            .identities
            .insert(NewIdentity {
                username,
                email,
                password_hash,
                role: request.role.unwrap_or_default(),
                created_at: self.tokens.now(),
            })
            .await
            .map_err(|e| {
                let err = conflict_from_store(e);
                context.log_error(&err, "insert rejected by store");
                err
            })?;

        let response = self.issue_pair(&identity).await?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %identity.id,
            role = %identity.role,
            "Identity registered successfully"
        );

        Ok(response)
    }

    /// Authenticate by username or email and return a fresh token pair
    ///
    /// # Errors
    /// - `InvalidInput`: empty identifier or password
    /// - `Unauthenticated`: unknown identifier or wrong password (indistinguishable)
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let context = ErrorContext::new("login");

        let identifier = request.username_or_email.trim();
        if identifier.is_empty() || request.password.is_empty() {
            let err = AuthError::InvalidInput("username/email and password are required".to_string());
            context.log_error(&err, "empty login field");
            return Err(err);
        }

        let identity = if identifier.contains('@') {
            self.identities.find_by_email(identifier).await?
        } else {
            self.identities.find_by_username(identifier).await?
        };

        let identity = match identity {
            Some(identity) => identity,
            None => {
                self.burn(request.password).await;
                return Err(unauthenticated(&context, "no identity for identifier"));
            }
        };

        let context = context.with_user_id(identity.id.to_string());

        if !self.verify(request.password, identity.password_hash.clone()).await {
            return Err(unauthenticated(&context, "password mismatch"));
        }

        let response = self.issue_pair(&identity).await?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %identity.id,
            "Identity logged in successfully"
        );

        Ok(response)
    }

    /// Exchange an (expired) access token plus a rotation token for a new pair
    ///
    /// # Errors
    /// `Unauthenticated` for a malformed rotation token, an access token
    /// whose signature/issuer/audience fail, a vanished identity, or (under
    /// `RotationPolicy::Bound`) a rotation token that was not issued to this
    /// identity, is expired, or was already used.
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AuthResponse, AuthError> {
        let context = ErrorContext::new("refresh");

        if !self.tokens.validate_rotation_token_shape(&request.refresh_token) {
            return Err(unauthenticated(&context, "malformed rotation token"));
        }

        let subject = match self.tokens.extract_subject_ignoring_expiry(&request.access_token) {
            Ok(subject) => subject,
            Err(_) => return Err(unauthenticated(&context, "access token not extractable")),
        };
        let context = context.with_user_id(subject.to_string());

        let identity = match self.identities.find_by_id(subject).await? {
            Some(identity) => identity,
            None => return Err(unauthenticated(&context, "identity no longer exists")),
        };

        if self.tokens.settings().rotation_policy == RotationPolicy::Bound {
            self.consume_rotation_token(&context, &identity, &request.refresh_token)
                .await?;
        }

        let response = self.issue_pair(&identity).await?;

        tracing::info!(
            request_id = %context.request_id,
            user_id = %identity.id,
            "Token refreshed successfully"
        );

        Ok(response)
    }

    /// Resolve the identity behind a presented access token
    ///
    /// # Errors
    /// `Unauthenticated` if the token fails validation or the identity is gone
    pub async fn validate_current_user(&self, access_token: &str) -> Result<Identity, AuthError> {
        let context = ErrorContext::new("validate_current_user");

        let subject = self.tokens.validate_access_token(access_token)?;

        match self.identities.find_by_id(subject).await? {
            Some(identity) => Ok(identity),
            None => Err(unauthenticated(
                &context.with_user_id(subject.to_string()),
                "identity no longer exists",
            )),
        }
    }

    /// Delete rotation-token records that are revoked or past their expiry.
    ///
    /// Intended for a periodic job owned by the caller.
    pub async fn purge_rotation_tokens(&self) -> Result<u64, AuthError> {
        let purged = self.refresh_tokens.purge_expired(self.tokens.now()).await?;

        tracing::info!(purged, "Purged spent rotation tokens");
        Ok(purged)
    }

    async fn consume_rotation_token(
        &self,
        context: &ErrorContext,
        identity: &Identity,
        token: &str,
    ) -> Result<(), AuthError> {
        let token_hash = hash_token(token);
        let now = self.tokens.now();

        let record = match self.refresh_tokens.find(&token_hash).await? {
            Some(record) => record,
            None => return Err(unauthenticated(context, "rotation token was never issued")),
        };

        if record.user_id != identity.id {
            return Err(unauthenticated(context, "rotation token issued to another identity"));
        }
        if record.is_revoked() {
            return Err(unauthenticated(context, "rotation token reused"));
        }
        if record.is_expired_at(now) {
            return Err(unauthenticated(context, "rotation token expired"));
        }

        // Lost race with a concurrent refresh using the same token
        if !self.refresh_tokens.revoke(&token_hash, now).await? {
            return Err(unauthenticated(context, "rotation token reused"));
        }

        Ok(())
    }

    async fn issue_pair(&self, identity: &Identity) -> Result<AuthResponse, AuthError> {
        let access_token = self.tokens.issue_access_token(identity)?;
        let refresh_token = self.tokens.issue_rotation_token();

        if self.tokens.settings().rotation_policy == RotationPolicy::Bound {
            let lifetime = Duration::days(self.tokens.settings().refresh_token_expiry_days);
            let record =
                RefreshTokenRecord::new(&refresh_token, identity.id, self.tokens.now(), lifetime);
            self.refresh_tokens.save(record).await?;
        }

        Ok(AuthResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in_seconds: self.tokens.expires_in_seconds(),
            user: identity.view(),
        })
    }

    // bcrypt is CPU-bound; keep it off the async workers

    async fn hash(&self, password: String) -> Result<String, AuthError> {
        let cost = self.hashing.cost;
        tokio::task::spawn_blocking(move || hash_password_with_cost(&password, cost))
            .await
            .map_err(|e| AuthError::Internal(format!("hashing task failed: {}", e)))?
    }

    async fn verify(&self, password: String, hash: String) -> bool {
        let decoy = self.decoy_hash.clone();
        tokio::task::spawn_blocking(move || verify_password_or_burn(&password, &hash, &decoy))
            .await
            .unwrap_or(false)
    }

    async fn burn(&self, password: String) {
        let decoy = self.decoy_hash.clone();
        let _ = tokio::task::spawn_blocking(move || burn_verification(&password, &decoy)).await;
    }
}

fn validate_registration(request: &RegisterRequest) -> Result<(String, String), AuthError> {
    if request.username.trim().is_empty()
        || request.email.trim().is_empty()
        || request.password.is_empty()
    {
        return Err(AuthError::InvalidInput(
            "username, email and password are required".to_string(),
        ));
    }

    let username = validate_username(&request.username)?;
    let email = validate_email(&request.email)?;
    validate_password_policy(&request.password)?;

    Ok((username, email))
}

/// A unique index that trips after the existence checks passed is still a conflict
fn conflict_from_store(err: StoreError) -> AuthError {
    match err {
        StoreError::UniqueViolation(constraint) => {
            let message = if constraint.contains("email") {
                "email is already in use"
            } else if constraint.contains("username") {
                "username is already in use"
            } else {
                "identity already exists"
            };
            AuthError::Conflict(message.to_string())
        }
        other => AuthError::Storage(other),
    }
}

fn unauthenticated(context: &ErrorContext, reason: &str) -> AuthError {
    let err = AuthError::Unauthenticated;
    context.log_error(&err, reason);
    err
}
