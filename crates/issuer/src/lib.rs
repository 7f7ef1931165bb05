//! Credential issuance core of an OpenID Connect provider.
//!
//! Matches redirect URIs, records consent, issues single-use authorization
//! codes and access/refresh/ID tokens, and stores RSA signing keys either in
//! the database or on disk.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod config;
pub mod entity;
pub mod error;
pub mod keys;
pub mod oidc;
pub mod sweep;

pub use error::IssuerError;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
