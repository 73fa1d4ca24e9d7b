//! Postgres-backed identity and rotation-token store.
//!
//! Case-insensitive uniqueness is enforced by the unique indexes on
//! `lower(email)` and `lower(username)` (see `migrations/`); a violation
//! surfaces as SQLSTATE 23505 and maps to `StoreError::UniqueViolation`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{IdentityStore, RefreshTokenStore};
use crate::auth::RefreshTokenRecord;
use crate::configuration::DatabaseSettings;
use crate::error::StoreError;
use crate::identity::{Identity, NewIdentity, Role};

type IdentityRow = (Uuid, String, String, String, String, DateTime<Utc>);
type RefreshTokenRow = (String, Uuid, DateTime<Utc>, DateTime<Utc>, Option<DateTime<Utc>>);

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.connection_string())
            .await?;

        tracing::info!(host = %settings.host, database = %settings.database_name, "Connected to identity store");
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {}", e)))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_identity(&self, sql: &str, key: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(identity_from_row).transpose()
    }
}

fn identity_from_row(row: IdentityRow) -> Result<Identity, StoreError> {
    let (id, username, email, password_hash, role, created_at) = row;
    let role = role
        .parse::<Role>()
        .map_err(|_| StoreError::Database(format!("unknown role '{}' for identity {}", role, id)))?;

    Ok(Identity {
        id,
        username,
        email,
        password_hash,
        role,
        created_at,
    })
}

fn record_from_row(row: RefreshTokenRow) -> RefreshTokenRecord {
    let (token_hash, user_id, created_at, expires_at, revoked_at) = row;
    RefreshTokenRecord {
        token_hash,
        user_id,
        created_at,
        expires_at,
        revoked_at,
    }
}

#[async_trait]
impl IdentityStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        self.find_identity(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM identities
            WHERE lower(email) = lower($1)
            "#,
            email,
        )
        .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        self.find_identity(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM identities
            WHERE lower(username) = lower($1)
            "#,
            username,
        )
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(
            r#"
            SELECT id, username, email, password_hash, role, created_at
            FROM identities
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(identity_from_row).transpose()
    }

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO identities (id, username, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .bind(identity.created_at)
        .execute(&self.pool)
        .await?;

        Ok(Identity {
            id,
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            role: identity.role,
            created_at: identity.created_at,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn save(&self, record: RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (token_hash, user_id, created_at, expires_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.user_id)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let row = sqlx::query_as::<_, RefreshTokenRow>(
            r#"
            SELECT token_hash, user_id, created_at, expires_at, revoked_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(record_from_row))
    }

    async fn revoke(&self, token_hash: &str, revoked_at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = $1
            WHERE token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(revoked_at)
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE revoked_at IS NOT NULL OR expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
