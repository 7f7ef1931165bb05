//! Keys stored inline in the `oidc_signing_key` table.

use super::{KeyStore, SigningKey, validate_key};
use crate::config::KeyStoreBackend;
use crate::entity::oidc_signing_key;
use crate::error::IssuerError;
use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait, QueryOrder};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct DatabaseKeyStore {
    db: Arc<DatabaseConnection>,
}

impl DatabaseKeyStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<oidc_signing_key::Model> for SigningKey {
    fn from(model: oidc_signing_key::Model) -> Self {
        SigningKey::from_bytes(model.id, model.key, model.created_at)
    }
}

#[async_trait]
impl KeyStore for DatabaseKeyStore {
    fn backend(&self) -> KeyStoreBackend {
        KeyStoreBackend::Database
    }

    #[tracing::instrument(skip(self, key))]
    async fn create(&self, key: &[u8]) -> Result<SigningKey, IssuerError> {
        validate_key(key)?;

        let row = oidc_signing_key::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            key: Set(key.to_vec()),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(self.db.as_ref())
        .await?;

        let stored = SigningKey::from(row);
        tracing::info!(kid = %stored.kid, "Stored signing key in database");
        Ok(stored)
    }

    async fn keys(&self) -> Result<Vec<SigningKey>, IssuerError> {
        let rows = oidc_signing_key::Entity::find()
            .order_by_asc(oidc_signing_key::Column::CreatedAt)
            .order_by_asc(oidc_signing_key::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(rows.into_iter().map(SigningKey::from).collect())
    }

    async fn key(&self, id: &str) -> Result<Option<SigningKey>, IssuerError> {
        Ok(oidc_signing_key::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(SigningKey::from))
    }

    #[tracing::instrument(skip(self))]
    async fn remove(&self, id: &str) -> Result<bool, IssuerError> {
        let result = oidc_signing_key::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }
}
