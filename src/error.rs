//! Error Handling Module
//!
//! A single closed error vocabulary for the credential subsystem:
//! 1. `AuthError` - what every public operation returns
//! 2. `StoreError` - what identity/token store collaborators return
//! 3. `ErrorContext` - per-operation structured logging of failures
//!
//! `Unauthenticated` deliberately carries no payload. The specific reason
//! (expired, bad signature, unknown user, wrong password) goes to the log,
//! never to the caller.

use thiserror::Error;

// ============================================================================
// 1. STORE ERRORS
// ============================================================================

/// Errors raised by persistence collaborators
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// A uniqueness constraint tripped; carries the constraint or field name
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                // 23505 = unique_violation
                if db_err.code().as_deref() == Some("23505") {
                    let constraint = db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| db_err.message().to_string());
                    StoreError::UniqueViolation(constraint)
                } else {
                    StoreError::Database(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

// ============================================================================
// 2. UNIFIED AUTH ERROR
// ============================================================================

/// Central error type for every credential operation
#[derive(Debug, Error)]
pub enum AuthError {
    /// Caller passed null/empty/malformed arguments
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A uniqueness rule would be violated
    #[error("conflict: {0}")]
    Conflict(String),
    /// Credential, signature, or expiry check failed
    #[error("authentication failed")]
    Unauthenticated,
    /// The subsystem itself is misconfigured (fatal at startup)
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A persistence collaborator failed; never retried here
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code for the transport layer
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidInput(_) => "INVALID_INPUT",
            AuthError::Conflict(_) => "CONFLICT",
            AuthError::Unauthenticated => "UNAUTHENTICATED",
            AuthError::Configuration(_) => "CONFIG_ERROR",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True when the caller can recover by changing what they sent
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidInput(_) | AuthError::Conflict(_) | AuthError::Unauthenticated
        )
    }
}

// ============================================================================
// 3. ERROR CONTEXT ENRICHMENT
// ============================================================================

/// Error context for structured logging of a single operation
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log a failure with a severity matching its kind.
    ///
    /// `reason` is the internal cause; it may be more specific than the
    /// error returned to the caller.
    pub fn log_error(&self, error: &AuthError, reason: &str) {
        let context = serde_json::json!({
            "request_id": self.request_id,
            "operation": self.operation,
            "user_id": self.user_id,
            "timestamp": self.timestamp.to_rfc3339(),
        });

        match error {
            AuthError::InvalidInput(_) => {
                tracing::warn!(error = %error, reason, context = ?context, "Validation error");
            }
            AuthError::Conflict(_) => {
                tracing::warn!(error = %error, reason, context = ?context, "Duplicate entry attempt");
            }
            AuthError::Unauthenticated => {
                tracing::warn!(error = %error, reason, context = ?context, "Authentication error");
            }
            AuthError::Configuration(_) => {
                tracing::error!(error = %error, reason, context = ?context, "Configuration error");
            }
            AuthError::Storage(_) => {
                tracing::error!(error = %error, reason, context = ?context, "Storage error");
            }
            AuthError::Internal(_) => {
                tracing::error!(error = %error, reason, context = ?context, "Internal error");
            }
        }
    }
}
