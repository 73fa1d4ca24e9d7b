use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    IdentityStore, RefreshTokenStore, EMAIL_UNIQUE_CONSTRAINT, USERNAME_UNIQUE_CONSTRAINT,
};
use crate::auth::RefreshTokenRecord;
use crate::error::StoreError;
use crate::identity::{Identity, NewIdentity};

/// In-process store for both identities and rotation-token records.
///
/// Uniqueness is checked under the write lock at insert time, the same
/// guarantee a unique index gives.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity_count(&self) -> Result<usize, StoreError> {
        Ok(read(&self.identities)?.len())
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StoreError> {
    lock.read()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StoreError> {
    lock.write()
        .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let identities = read(&self.identities)?;
        Ok(identities
            .values()
            .find(|i| i.email.to_lowercase() == email.to_lowercase())
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let identities = read(&self.identities)?;
        Ok(identities
            .values()
            .find(|i| i.username.to_lowercase() == username.to_lowercase())
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(read(&self.identities)?.get(&id).cloned())
    }

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let mut identities = write(&self.identities)?;

        let email = identity.email.to_lowercase();
        let username = identity.username.to_lowercase();
        if identities.values().any(|i| i.email.to_lowercase() == email) {
            return Err(StoreError::UniqueViolation(EMAIL_UNIQUE_CONSTRAINT.to_string()));
        }
        if identities.values().any(|i| i.username.to_lowercase() == username) {
            return Err(StoreError::UniqueViolation(USERNAME_UNIQUE_CONSTRAINT.to_string()));
        }

        let stored = Identity {
            id: Uuid::new_v4(),
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            role: identity.role,
            created_at: identity.created_at,
        };
        identities.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryStore {
    async fn save(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        let mut tokens = write(&self.refresh_tokens)?;
        if tokens.contains_key(&record.token_hash) {
            return Err(StoreError::UniqueViolation("refresh_tokens_pkey".to_string()));
        }
        tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(read(&self.refresh_tokens)?.get(token_hash).cloned())
    }

    async fn revoke(&self, token_hash: &str, revoked_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut tokens = write(&self.refresh_tokens)?;
        match tokens.get_mut(token_hash) {
            Some(record) if record.revoked_at.is_none() => {
                record.revoked_at = Some(revoked_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tokens = write(&self.refresh_tokens)?;
        let before = tokens.len();
        tokens.retain(|_, record| !record.is_revoked() && !record.is_expired_at(now));
        Ok((before - tokens.len()) as u64)
    }
}
