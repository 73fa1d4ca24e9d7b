//! Authentication module
//!
//! Handles password hashing, access token issuance/validation,
//! and rotation token generation.

mod claims;
mod jwt;
mod password;
mod refresh_token;

pub use claims::Claims;
pub use jwt::TokenService;
pub(crate) use password::{burn_verification, verify_password_or_burn};
pub use password::{
    dummy_hash, hash_password, hash_password_with_cost, verify_password, MAX_PASSWORD_BYTES,
};
pub use refresh_token::{
    generate_rotation_token, hash_token, is_well_formed_rotation_token, RefreshTokenRecord,
    ROTATION_TOKEN_BYTES,
};
