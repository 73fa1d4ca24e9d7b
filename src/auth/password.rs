//! Password Hashing and Verification
//!
//! One-way, salted bcrypt hashing. Every call to `hash_password` draws a
//! fresh salt, so hashing the same password twice yields different strings.
//!
//! bcrypt only reads the first 72 bytes of its input, so longer passwords
//! are refused outright instead of being silently truncated.

use bcrypt::{hash, verify, DEFAULT_COST};
use lazy_static::lazy_static;

use crate::error::AuthError;

/// Longest input bcrypt hashes without truncation
pub const MAX_PASSWORD_BYTES: usize = 72;

const DUMMY_PASSWORD: &str = "dummy-password-for-timing";

lazy_static! {
    /// Fallback target at the default cost for `verify_password`
    static ref DUMMY_HASH: String = hash(DUMMY_PASSWORD, DEFAULT_COST).unwrap_or_default();
}

/// Hash a password using bcrypt at the default cost (12)
///
/// # Errors
/// `InvalidInput` if the password is empty or whitespace-only
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with_cost(password, DEFAULT_COST)
}

/// Hash a password using bcrypt at an explicit cost
///
/// # Errors
/// `InvalidInput` if the password is blank or longer than [`MAX_PASSWORD_BYTES`]
pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    if password.trim().is_empty() {
        return Err(AuthError::InvalidInput("password is empty".to_string()));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AuthError::InvalidInput(format!(
            "password is longer than {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }

    hash(password, cost).map_err(|e| AuthError::Internal(format!("Password hashing failed: {}", e)))
}

/// Hash a fixed throwaway password at `cost`, for use as a timing decoy
pub fn dummy_hash(cost: u32) -> Result<String, AuthError> {
    hash_password_with_cost(DUMMY_PASSWORD, cost)
}

/// Verify a password against its hash
///
/// Never fails: an empty password, empty hash, oversized password, or
/// foreign/malformed hash all yield `false`, the same as a wrong password.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    verify_password_or_burn(password, hashed, DUMMY_HASH.as_str())
}

/// `verify_password`, spending one verification against `decoy` whenever
/// there is no usable target, so every `false` costs about the same.
pub(crate) fn verify_password_or_burn(password: &str, hashed: &str, decoy: &str) -> bool {
    if password.is_empty() {
        return false;
    }

    // Nothing this long was ever hashed; a truncated match would be a false positive
    if hashed.is_empty() || password.len() > MAX_PASSWORD_BYTES {
        burn_verification(password, decoy);
        return false;
    }

    match verify(password, hashed) {
        Ok(valid) => valid,
        Err(e) => {
            tracing::debug!("Password hash could not be parsed: {}", e);
            burn_verification(password, decoy);
            false
        }
    }
}

/// Spend one bcrypt verification against `decoy`
pub(crate) fn burn_verification(password: &str, decoy: &str) {
    let _ = verify(password, decoy);
}
