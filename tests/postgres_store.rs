//! Requires a running Postgres reachable with `configuration.yaml` (or
//! `APP_DATABASE__*` overrides). Run with `cargo test -- --ignored`.

use std::sync::Arc;

use chrono::{Duration, Utc};
use forum_auth::auth::{generate_rotation_token, RefreshTokenRecord};
use forum_auth::configuration::{get_configuration, DatabaseSettings, HashingSettings};
use forum_auth::error::{AuthError, StoreError};
use forum_auth::identity::{NewIdentity, Role};
use forum_auth::service::{CredentialService, LoginRequest, RegisterRequest};
use forum_auth::store::{
    IdentityStore, PgStore, RefreshTokenStore, EMAIL_UNIQUE_CONSTRAINT, USERNAME_UNIQUE_CONSTRAINT,
};
use sqlx::{Connection, Executor, PgConnection};

async fn configure_store(config: &DatabaseSettings) -> PgStore {
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");

    let store = PgStore::connect(config)
        .await
        .expect("Failed to connect to Postgres.");
    store.migrate().await.expect("Failed to migrate the database.");
    store
}

async fn spawn_store() -> PgStore {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    configure_store(&configuration.database).await
}

fn new_identity(username: &str, email: &str) -> NewIdentity {
    NewIdentity {
        username: username.to_string(),
        email: email.to_string(),
        password_hash: "$2b$04$placeholder".to_string(),
        role: Role::Moderator,
        created_at: Utc::now(),
    }
}

#[tokio::test]
#[ignore]
async fn unique_indexes_are_case_insensitive() {
    let store = spawn_store().await;
    let stored = store
        .insert(new_identity("Alice", "Alice@Example.com"))
        .await
        .unwrap();

    let found = store.find_by_email("alice@example.com").await.unwrap().unwrap();
    assert_eq!(found.id, stored.id);
    assert_eq!(found.role, Role::Moderator);

    match store.insert(new_identity("bob", "ALICE@example.com")).await {
        Err(StoreError::UniqueViolation(c)) => assert_eq!(c, EMAIL_UNIQUE_CONSTRAINT),
        other => panic!("Expected email violation, got {:?}", other.map(|i| i.id)),
    }
    match store.insert(new_identity("ALICE", "bob@example.com")).await {
        Err(StoreError::UniqueViolation(c)) => assert_eq!(c, USERNAME_UNIQUE_CONSTRAINT),
        other => panic!("Expected username violation, got {:?}", other.map(|i| i.id)),
    }
}

#[tokio::test]
#[ignore]
async fn rotation_token_revocation_is_single_shot() {
    let store = spawn_store().await;
    let identity = store
        .insert(new_identity("alice", "alice@example.com"))
        .await
        .unwrap();

    let token = generate_rotation_token();
    let record = RefreshTokenRecord::new(&token, identity.id, Utc::now(), Duration::days(7));
    let hash = record.token_hash.clone();
    store.save(record).await.unwrap();

    assert!(store.revoke(&hash, Utc::now()).await.unwrap());
    assert!(!store.revoke(&hash, Utc::now()).await.unwrap());
    assert!(store.find(&hash).await.unwrap().unwrap().is_revoked());

    let live = RefreshTokenRecord::new(&generate_rotation_token(), identity.id, Utc::now(), Duration::days(7));
    let live_hash = live.token_hash.clone();
    store.save(live).await.unwrap();

    assert_eq!(store.purge_expired(Utc::now()).await.unwrap(), 1);
    assert!(store.find(&hash).await.unwrap().is_none());
    assert!(store.find(&live_hash).await.unwrap().is_some());
}

#[tokio::test]
#[ignore]
async fn register_and_login_against_postgres() {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();
    configuration.hashing = HashingSettings { cost: 4 };
    let store = Arc::new(configure_store(&configuration.database).await);

    let service = CredentialService::from_settings(&configuration, store.clone(), store)
        .expect("Failed to build credential service");

    let registered = service
        .register(RegisterRequest {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "longenoughpassword".to_string(),
            role: None,
        })
        .await
        .unwrap();

    let duplicate = service
        .register(RegisterRequest {
            username: "someone".to_string(),
            email: "ALICE@example.com".to_string(),
            password: "longenoughpassword".to_string(),
            role: None,
        })
        .await;
    assert!(matches!(duplicate, Err(AuthError::Conflict(_))));

    let logged_in = service
        .login(LoginRequest {
            username_or_email: "alice".to_string(),
            password: "longenoughpassword".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(logged_in.user.id, registered.user.id);
}
