//! Rotation ("refresh") token management
//!
//! Rotation tokens are:
//! - 64 cryptographically secure random bytes, standard base64-encoded
//! - Opaque: nothing about the identity is encoded in them
//! - Hashed with SHA-256 before storage (the plaintext is never stored)
//! - Single-use when the `Bound` rotation policy is active

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::{thread_rng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Decoded length of every rotation token
pub const ROTATION_TOKEN_BYTES: usize = 64;

/// Generate a new rotation token
///
/// The plaintext goes to the client; only `hash_token(token)` is persisted.
pub fn generate_rotation_token() -> String {
    let mut bytes = [0u8; ROTATION_TOKEN_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Shape check only: non-empty, valid base64, exactly 64 decoded bytes.
///
/// This says nothing about whether the token was ever issued.
pub fn is_well_formed_rotation_token(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }

    match BASE64.decode(token) {
        Ok(bytes) => bytes.len() == ROTATION_TOKEN_BYTES,
        Err(_) => false,
    }
}

/// SHA-256 hex digest of a rotation token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Server-side record binding a rotation token to the identity it was issued to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    pub fn new(token: &str, user_id: Uuid, created_at: DateTime<Utc>, lifetime: Duration) -> Self {
        Self {
            token_hash: hash_token(token),
            user_id,
            created_at,
            expires_at: created_at + lifetime,
            revoked_at: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_rotation_token() {
        let token = generate_rotation_token();

        // 64 bytes -> 88 base64 chars with padding
        assert_eq!(token.len(), 88);
        assert_eq!(BASE64.decode(&token).unwrap().len(), ROTATION_TOKEN_BYTES);
        assert!(is_well_formed_rotation_token(&token));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(generate_rotation_token(), generate_rotation_token());
    }

    #[test]
    fn test_shape_validation_rejects_malformed() {
        assert!(!is_well_formed_rotation_token(""));
        assert!(!is_well_formed_rotation_token("not base64 at all!"));
        assert!(!is_well_formed_rotation_token(&BASE64.encode([0u8; 32])));
        assert!(!is_well_formed_rotation_token(&BASE64.encode([0u8; 65])));
        assert!(is_well_formed_rotation_token(&BASE64.encode([7u8; 64])));
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_rotation_token();
        let hash1 = hash_token(&token);
        let hash2 = hash_token(&token);

        // Same token should produce same hash
        assert_eq!(hash1, hash2);
        // Hash should not equal plaintext
        assert_ne!(token, hash1);
        // Hash should be 64 chars (SHA-256 hex)
        assert_eq!(hash1.len(), 64);
        assert_ne!(hash1, hash_token(&generate_rotation_token()));
    }

    #[test]
    fn test_record_lifecycle() {
        let token = generate_rotation_token();
        let now = Utc::now();
        let record = RefreshTokenRecord::new(&token, Uuid::new_v4(), now, Duration::days(7));

        assert_eq!(record.token_hash, hash_token(&token));
        assert!(!record.is_revoked());
        assert!(!record.is_expired_at(now + Duration::days(7)));
        assert!(record.is_expired_at(now + Duration::days(7) + Duration::seconds(1)));
    }
}
