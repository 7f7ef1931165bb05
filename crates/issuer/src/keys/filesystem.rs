//! Keys stored as files in a [`BlobStore`], indexed by `oidc_signing_key_file` rows.

use super::{BlobStore, KeyStore, SigningKey, compute_kid, validate_key};
use crate::config::KeyStoreBackend;
use crate::entity::oidc_signing_key_file;
use crate::error::IssuerError;
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, QueryOrder};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct FilesystemKeyStore {
    db: Arc<DatabaseConnection>,
    blobs: BlobStore,
}

impl FilesystemKeyStore {
    pub fn new(db: Arc<DatabaseConnection>, blobs: BlobStore) -> Self {
        Self { db, blobs }
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// `kid` is always computed from the bytes just read back, never cached.
    async fn load(&self, row: oidc_signing_key_file::Model) -> Result<SigningKey, IssuerError> {
        let key = self.blobs.open(&row.locator).await?;
        Ok(SigningKey::from_bytes(row.id, key, row.created_at))
    }
}

#[async_trait]
impl KeyStore for FilesystemKeyStore {
    fn backend(&self) -> KeyStoreBackend {
        KeyStoreBackend::Filesystem
    }

    #[tracing::instrument(skip(self, key))]
    async fn create(&self, key: &[u8]) -> Result<SigningKey, IssuerError> {
        validate_key(key)?;

        let kid = compute_kid(key);
        let locator = self.blobs.put(&kid, key).await?;
        let row = oidc_signing_key_file::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            locator: Set(locator.clone()),
            created_at: Set(OffsetDateTime::now_utc()),
        };

        match row.insert(self.db.as_ref()).await {
            Ok(row) => {
                tracing::info!(kid = %kid, locator = %locator, "Stored signing key on filesystem");
                Ok(SigningKey::from_bytes(row.id, key.to_vec(), row.created_at))
            }
            Err(e) => {
                if let Err(cleanup) = self.blobs.delete(&locator).await {
                    tracing::warn!(locator = %locator, "Failed to remove orphaned key file: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }

    async fn keys(&self) -> Result<Vec<SigningKey>, IssuerError> {
        let rows = oidc_signing_key_file::Entity::find()
            .order_by_asc(oidc_signing_key_file::Column::CreatedAt)
            .order_by_asc(oidc_signing_key_file::Column::Id)
            .all(self.db.as_ref())
            .await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in rows {
            keys.push(self.load(row).await?);
        }
        Ok(keys)
    }

    async fn key(&self, id: &str) -> Result<Option<SigningKey>, IssuerError> {
        match oidc_signing_key_file::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
        {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<bool, IssuerError> {
        let Some(row) = oidc_signing_key_file::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(false);
        };

        let result = oidc_signing_key_file::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Ok(false);
        }
        self.blobs.delete(&row.locator).await?;
        Ok(true)
    }
}
