//! Input validators for registration
//! Features:
//! 1. DoS Protection: input length limits
//! 2. Username charset restriction (usernames are rendered everywhere)
//! 3. Email format validation
//! 4. Password length policy (Register only)

use regex::Regex;
use lazy_static::lazy_static;

use crate::auth::MAX_PASSWORD_BYTES;

const MIN_USERNAME_LENGTH: usize = 3;
const MAX_USERNAME_LENGTH: usize = 50;
const MAX_EMAIL_LENGTH: usize = 100;
const MIN_PASSWORD_LENGTH: usize = 8;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();

    static ref USERNAME_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap();
}

/// Validates and normalizes a username (trimmed)
pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("username"));
    }

    let length = trimmed.chars().count();
    if length < MIN_USERNAME_LENGTH {
        return Err(ValidationError::TooShort("username", MIN_USERNAME_LENGTH));
    }

    if length > MAX_USERNAME_LENGTH {
        return Err(ValidationError::TooLong("username", MAX_USERNAME_LENGTH));
    }

    if !USERNAME_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("username"));
    }

    Ok(trimmed.to_string())
}

/// Validates and normalizes an email address (trimmed)
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email"));
    }

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if has_suspicious_email_patterns(trimmed) {
        return Err(ValidationError::SuspiciousContent("email"));
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email"));
    }

    Ok(trimmed.to_string())
}

/// Registration password policy. Passwords are never trimmed.
pub fn validate_password_policy(password: &str) -> Result<(), ValidationError> {
    if password.trim().is_empty() {
        return Err(ValidationError::EmptyField("password"));
    }

    // Minimum counts chars so multi-byte passwords are not penalised
    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort("password", MIN_PASSWORD_LENGTH));
    }

    // bcrypt ignores anything past this, so the limit is in bytes
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ValidationError::TooManyBytes("password", MAX_PASSWORD_BYTES));
    }

    Ok(())
}

fn has_suspicious_email_patterns(email: &str) -> bool {
    if email.matches('@').count() != 1 {
        return true;
    }

    if email.contains('\0') {
        return true;
    }

    // Local part is capped at 64 octets (RFC 5321)
    if let Some(at_pos) = email.find('@') {
        if at_pos > 64 {
            return true;
        }
    }

    false
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyField(&'static str),
    TooShort(&'static str, usize),
    TooLong(&'static str, usize),
    TooManyBytes(&'static str, usize),
    InvalidFormat(&'static str),
    SuspiciousContent(&'static str),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} is empty", field),
            ValidationError::TooShort(field, min) => write!(f, "{} is too short (minimum {} characters)", field, min),
            ValidationError::TooLong(field, max) => write!(f, "{} is too long (maximum {} characters)", field, max),
            ValidationError::TooManyBytes(field, max) => write!(f, "{} is too long (maximum {} bytes)", field, max),
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => write!(f, "{} contains suspicious content", field),
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for crate::error::AuthError {
    fn from(err: ValidationError) -> Self {
        crate::error::AuthError::InvalidInput(err.to_string())
    }
}
