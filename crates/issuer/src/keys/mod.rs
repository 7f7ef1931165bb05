//! Signing key storage.
//!
//! Keys are kept either inline in the database or as files in a blob store on
//! disk. Both backends implement [`KeyStore`]; which one is used is decided once
//! at startup from [`KeyStoreConfig`]. A key's `kid` is a content fingerprint of
//! its exact bytes, so it stays the same when a key moves between backends.

mod blob;
pub mod database;
pub mod filesystem;
pub mod migrate;

pub use blob::BlobStore;
pub use database::DatabaseKeyStore;
pub use filesystem::FilesystemKeyStore;

use crate::config::{KeyStoreBackend, KeyStoreConfig};
use crate::error::IssuerError;
use async_trait::async_trait;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use time::OffsetDateTime;

/// A snapshot of one stored key, read fresh from its backend.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey {
    /// Storage row id (backend specific, not the `kid`)
    pub id: String,
    pub kid: String,
    pub key: Vec<u8>,
    pub created_at: OffsetDateTime,
}

impl SigningKey {
    pub(crate) fn from_bytes(id: String, key: Vec<u8>, created_at: OffsetDateTime) -> Self {
        Self {
            kid: compute_kid(&key),
            id,
            key,
            created_at,
        }
    }

    pub fn rsa_private_key(&self) -> Result<RsaPrivateKey, IssuerError> {
        parse_private_key(&self.key)
    }
}

// Key bytes stay out of logs.
impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("id", &self.id)
            .field("kid", &self.kid)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Content fingerprint of raw key bytes. Not a security boundary, only an
/// identifier. Empty input yields an empty `kid`.
pub fn compute_kid(key: &[u8]) -> String {
    if key.is_empty() {
        return String::new();
    }
    blake3::hash(key).to_hex().to_string()
}

/// Parse an RSA private key from PKCS#1 (DER or PEM), PKCS#8 (DER or PEM) or
/// OpenSSH text format.
pub fn parse_private_key(key: &[u8]) -> Result<RsaPrivateKey, IssuerError> {
    if let Ok(parsed) = RsaPrivateKey::from_pkcs1_der(key) {
        return Ok(parsed);
    }
    if let Ok(parsed) = RsaPrivateKey::from_pkcs8_der(key) {
        return Ok(parsed);
    }
    if let Ok(text) = std::str::from_utf8(key) {
        let text = text.trim();
        if let Ok(parsed) = RsaPrivateKey::from_pkcs1_pem(text) {
            return Ok(parsed);
        }
        if let Ok(parsed) = RsaPrivateKey::from_pkcs8_pem(text) {
            return Ok(parsed);
        }
        if let Ok(openssh) = ssh_key::PrivateKey::from_openssh(text)
            && let Some(keypair) = openssh.key_data().rsa()
            && let Ok(parsed) = RsaPrivateKey::try_from(keypair)
        {
            return Ok(parsed);
        }
    }
    Err(IssuerError::Validation(
        "Could not validate RSA key. It must be in either PKCS#1 (binary or PEM), PKCS#8 \
         (binary or PEM), or OpenSSH text format"
            .into(),
    ))
}

/// Reject anything that is not a usable private key before it is persisted.
pub fn validate_key(key: &[u8]) -> Result<(), IssuerError> {
    parse_private_key(key).map(|_| ())
}

#[async_trait]
pub trait KeyStore: Send + Sync {
    fn backend(&self) -> KeyStoreBackend;

    /// Validate and persist new key material.
    async fn create(&self, key: &[u8]) -> Result<SigningKey, IssuerError>;

    /// All keys, oldest first. Every call re-reads key bytes from storage.
    async fn keys(&self) -> Result<Vec<SigningKey>, IssuerError>;

    async fn key(&self, id: &str) -> Result<Option<SigningKey>, IssuerError>;

    /// Returns whether a key was removed.
    async fn remove(&self, id: &str) -> Result<bool, IssuerError>;
}

/// Resolve the configured backend. Misconfiguration is fatal and reported
/// here, before any request is served.
pub fn open_key_store(
    config: &KeyStoreConfig,
    db: Arc<DatabaseConnection>,
) -> Result<Arc<dyn KeyStore>, IssuerError> {
    match config.backend()? {
        KeyStoreBackend::Database => Ok(Arc::new(DatabaseKeyStore::new(db))),
        KeyStoreBackend::Filesystem => {
            let root = config.filesystem_location()?;
            Ok(Arc::new(FilesystemKeyStore::new(db, BlobStore::new(root))))
        }
    }
}

/// The key ID tokens are signed with: the oldest stored key.
pub async fn active_signing_key(store: &dyn KeyStore) -> Result<Option<SigningKey>, IssuerError> {
    Ok(store.keys().await?.into_iter().next())
}
