//! OIDC Client entity - registered relying parties.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oidc_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Client secret (None for public clients)
    pub secret: Option<String>,
    /// Human-readable client name
    pub name: String,
    /// "confidential" or "public"
    pub client_type: String,
    /// Newline-separated list of allowed redirect URIs, default first
    pub redirect_uris: String,
    /// Newline-separated list of allowed post-logout redirect URIs
    pub post_logout_redirect_uris: String,
    /// Newline-separated list of allowed response types
    pub response_types: String,
    /// Space-separated list of allowed scopes
    pub scopes: String,
    /// ID token signing algorithm, "HS256" or "RS256"
    pub jwt_alg: String,
    pub require_consent: bool,
    pub reuse_consent: bool,
    pub require_pkce: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
