//! Issuer state.
//!
//! Wires the registry, consent ledger, key store and credential issuer around
//! one database connection and one event bus.

use crate::config::AppConfig;
use crate::error::IssuerError;
use crate::keys::{KeyStore, open_key_store};
use crate::oidc::client::ClientRegistry;
use crate::oidc::consent::ConsentLedger;
use crate::oidc::events::EventBus;
use crate::oidc::id_token::IdTokenSigner;
use crate::oidc::issuer::CredentialIssuer;
use crate::oidc::policy::{RefreshPolicy, policy_from_config};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

#[derive(Clone)]
pub struct IssuerState {
    pub db: Arc<DatabaseConnection>,
    pub clients: ClientRegistry,
    pub consent: ConsentLedger,
    pub issuer: CredentialIssuer,
    pub key_store: Arc<dyn KeyStore>,
    pub events: EventBus,
}

impl IssuerState {
    /// Build the state from configuration. Key store misconfiguration is
    /// reported here and is fatal.
    pub fn from_config(db: Arc<DatabaseConnection>, config: &AppConfig) -> Result<Self, IssuerError> {
        let key_store = open_key_store(&config.key_store, db.clone())?;
        tracing::info!(backend = key_store.backend().as_str(), "Key store opened");
        Ok(Self::with_parts(
            db,
            config,
            key_store,
            policy_from_config(&config.refresh_policy),
        ))
    }

    /// Build the state around an explicit key store and refresh policy.
    pub fn with_parts(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        key_store: Arc<dyn KeyStore>,
        refresh_policy: Arc<dyn RefreshPolicy>,
    ) -> Self {
        let events = EventBus::default();
        let signer = IdTokenSigner::new(
            config.issuer_url.clone(),
            config.lifetimes.id_token(),
            key_store.clone(),
        );
        Self {
            clients: ClientRegistry::new(db.clone()),
            consent: ConsentLedger::new(db.clone(), config.lifetimes.consent(), events.clone()),
            issuer: CredentialIssuer::new(
                db.clone(),
                config.lifetimes.clone(),
                signer,
                refresh_policy,
                events.clone(),
            ),
            db,
            key_store,
            events,
        }
    }
}
