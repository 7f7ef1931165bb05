//! OIDC Token entity - access/refresh token pairs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oidc_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub access_token: String,
    #[sea_orm(unique)]
    pub refresh_token: String,
    pub client_id: String,
    /// None for grants without an end user
    pub user_id: Option<String>,
    pub scope: String,
    /// JSON-encoded ID token claims, empty when no ID token was issued
    #[sea_orm(column_type = "Text")]
    pub id_token: String,
    pub access_expires_at: OffsetDateTime,
    pub issued_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
