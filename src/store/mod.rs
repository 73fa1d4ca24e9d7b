//! Persistence collaborators.
//!
//! The credential service only talks to these traits. Implementations must
//! enforce case-insensitive uniqueness of email and username themselves
//! (a unique index, not an in-process lock) and report a violation as
//! [`StoreError::UniqueViolation`].

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::RefreshTokenRecord;
use crate::error::StoreError;
use crate::identity::{Identity, NewIdentity};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Constraint names shared by both implementations
pub const EMAIL_UNIQUE_CONSTRAINT: &str = "identities_email_lower_idx";
pub const USERNAME_UNIQUE_CONSTRAINT: &str = "identities_username_lower_idx";

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Case-insensitive lookup
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    /// Case-insensitive lookup
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// Persist a new identity and assign its id
    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn save(&self, record: RefreshTokenRecord) -> Result<(), StoreError>;

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Mark a record revoked. Returns `false` if it was missing or already
    /// revoked, so two concurrent refreshes cannot both consume it.
    async fn revoke(&self, token_hash: &str, revoked_at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Delete records that are revoked or expired as of `now`, returning how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
