//! Shared fixtures for integration tests: an in-memory SQLite schema matching
//! the migration, test configuration and RSA key material.
#![allow(dead_code)]

use oidc_issuer::config::{AppConfig, KeyStoreConfig, LifetimeConfig, RefreshPolicyConfig};
use oidc_issuer::entity::oidc_client;
use oidc_issuer::keys::{DatabaseKeyStore, KeyStore};
use oidc_issuer::oidc::policy::{AlwaysAlive, RefreshPolicy};
use oidc_issuer::oidc::{Client, ClientType, IssuerState, JwtAlg};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::sync::Arc;

pub const PKCS1_PEM: &[u8] = include_bytes!("../fixtures/pkcs1.pem");
pub const PKCS8_PEM: &[u8] = include_bytes!("../fixtures/pkcs8.pem");
pub const PKCS1_DER: &[u8] = include_bytes!("../fixtures/pkcs1.der");
pub const PKCS8_DER: &[u8] = include_bytes!("../fixtures/pkcs8.der");
pub const OPENSSH: &[u8] = include_bytes!("../fixtures/openssh.key");

pub const ISSUER_URL: &str = "https://id.example.org";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE oidc_client (
        id TEXT PRIMARY KEY,
        secret TEXT NULL,
        name TEXT NOT NULL,
        client_type TEXT NOT NULL DEFAULT 'confidential',
        redirect_uris TEXT NOT NULL DEFAULT '',
        post_logout_redirect_uris TEXT NOT NULL DEFAULT '',
        response_types TEXT NOT NULL DEFAULT 'code',
        scopes TEXT NOT NULL DEFAULT '',
        jwt_alg TEXT NOT NULL DEFAULT 'RS256',
        require_consent INTEGER NOT NULL DEFAULT 1,
        reuse_consent INTEGER NOT NULL DEFAULT 1,
        require_pkce INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oidc_code (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        nonce TEXT NULL,
        is_authentication INTEGER NOT NULL DEFAULT 0,
        code_challenge TEXT NULL,
        code_challenge_method TEXT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oidc_token (
        id TEXT PRIMARY KEY,
        access_token TEXT NOT NULL UNIQUE,
        refresh_token TEXT NOT NULL UNIQUE,
        client_id TEXT NOT NULL,
        user_id TEXT NULL,
        scope TEXT NOT NULL,
        id_token TEXT NOT NULL DEFAULT '',
        access_expires_at TEXT NOT NULL,
        issued_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oidc_user_consent (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        scope TEXT NOT NULL,
        date_given TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );"#,
    r#"CREATE UNIQUE INDEX idx_oidc_user_consent_user_client
        ON oidc_user_consent (user_id, client_id);"#,
    r#"CREATE TABLE oidc_signing_key (
        id TEXT PRIMARY KEY,
        key BLOB NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE oidc_signing_key_file (
        id TEXT PRIMARY KEY,
        locator TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL
    );"#,
];

/// Fresh in-memory database with the issuer schema.
pub async fn test_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    for ddl in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, ddl.to_string()))
            .await
            .expect("create schema");
    }
    Arc::new(db)
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        issuer_url: ISSUER_URL.into(),
        key_store: KeyStoreConfig::default(),
        lifetimes: LifetimeConfig::default(),
        refresh_policy: RefreshPolicyConfig::default(),
        sweep_interval_seconds: 0,
    }
}

/// State backed by the database key store, seeded with one RSA key.
pub async fn test_state(db: Arc<DatabaseConnection>) -> IssuerState {
    test_state_with_policy(db, Arc::new(AlwaysAlive)).await
}

pub async fn test_state_with_policy(
    db: Arc<DatabaseConnection>,
    policy: Arc<dyn RefreshPolicy>,
) -> IssuerState {
    let key_store = DatabaseKeyStore::new(db.clone());
    key_store.create(PKCS1_PEM).await.expect("seed signing key");
    IssuerState::with_parts(db, &test_config(), Arc::new(key_store), policy)
}

pub fn confidential_client(id: &str) -> Client {
    let mut client = Client::new(id, format!("Client {id}"));
    client.secret = Some(format!("{id}-secret"));
    client.redirect_uris = vec![format!("https://{id}.example.com/callback")];
    client.scope = vec!["openid".into(), "email".into(), "profile".into()];
    client
}

pub fn public_client(id: &str) -> Client {
    let mut client = confidential_client(id);
    client.client_type = ClientType::Public;
    client.secret = None;
    client
}

pub fn hs256_client(id: &str) -> Client {
    let mut client = confidential_client(id);
    client.jwt_alg = JwtAlg::HS256;
    client
}

pub async fn insert_client(db: &DatabaseConnection, client: &Client) {
    oidc_client::ActiveModel::try_from(client)
        .expect("valid client")
        .insert(db)
        .await
        .expect("insert client");
}

pub fn scope(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
