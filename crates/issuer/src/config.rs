use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::error::IssuerError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Where signing keys live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyStoreBackend {
    Database,
    Filesystem,
}

impl KeyStoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStoreBackend::Database => "database",
            KeyStoreBackend::Filesystem => "filesystem",
        }
    }
}

impl FromStr for KeyStoreBackend {
    type Err = IssuerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "database" => Ok(KeyStoreBackend::Database),
            "filesystem" => Ok(KeyStoreBackend::Filesystem),
            other => Err(IssuerError::UnreachablePolicy(format!(
                "unknown key store backend '{other}' (expected 'database' or 'filesystem')"
            ))),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct KeyStoreConfig {
    #[serde(default = "default_key_store_backend")]
    pub backend: String,
    /// Root directory of the key blob store. Required for the filesystem backend.
    #[serde(default)]
    pub location: Option<PathBuf>,
}

impl Default for KeyStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_key_store_backend(),
            location: None,
        }
    }
}

impl KeyStoreConfig {
    pub fn backend(&self) -> Result<KeyStoreBackend, IssuerError> {
        self.backend.parse()
    }

    /// The blob store root, or `MisconfiguredStorage` when none is set.
    pub fn filesystem_location(&self) -> Result<&Path, IssuerError> {
        match self.location.as_deref() {
            Some(path) if !path.as_os_str().is_empty() => Ok(path),
            _ => Err(IssuerError::MisconfiguredStorage(
                "key_store.location must be configured when key_store.backend is 'filesystem'"
                    .into(),
            )),
        }
    }
}

fn default_key_store_backend() -> String {
    KeyStoreBackend::Database.as_str().to_string()
}

/// Lifetimes in seconds.
#[derive(Clone, Debug, Deserialize)]
pub struct LifetimeConfig {
    #[serde(default = "default_code_seconds")]
    pub code_seconds: i64,
    #[serde(default = "default_access_token_seconds")]
    pub access_token_seconds: i64,
    #[serde(default = "default_id_token_seconds")]
    pub id_token_seconds: i64,
    #[serde(default = "default_consent_seconds")]
    pub consent_seconds: i64,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            code_seconds: default_code_seconds(),
            access_token_seconds: default_access_token_seconds(),
            id_token_seconds: default_id_token_seconds(),
            consent_seconds: default_consent_seconds(),
        }
    }
}

impl LifetimeConfig {
    pub fn code(&self) -> time::Duration {
        time::Duration::seconds(self.code_seconds)
    }

    pub fn access_token(&self) -> time::Duration {
        time::Duration::seconds(self.access_token_seconds)
    }

    pub fn id_token(&self) -> time::Duration {
        time::Duration::seconds(self.id_token_seconds)
    }

    pub fn consent(&self) -> time::Duration {
        time::Duration::seconds(self.consent_seconds)
    }
}

/// Upper bound for every configured lifetime (ten years).
pub const MAX_LIFETIME_SECONDS: i64 = 10 * 365 * 86400;

fn default_code_seconds() -> i64 {
    600
}

fn default_access_token_seconds() -> i64 {
    3600
}

fn default_id_token_seconds() -> i64 {
    600
}

fn default_consent_seconds() -> i64 {
    86400 * 90
}

/// Which built-in refresh-token liveness hook to install.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshPolicyConfig {
    #[default]
    Always,
    MaxAge { seconds: i64 },
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    /// Value of the `iss` claim in ID tokens.
    pub issuer_url: String,
    #[serde(default)]
    pub key_store: KeyStoreConfig,
    #[serde(default)]
    pub lifetimes: LifetimeConfig,
    #[serde(default)]
    pub refresh_policy: RefreshPolicyConfig,
    /// Interval of the expiry sweep. 0 disables it.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_sweep_interval_seconds() -> u64 {
    3600
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Environment variables override file values using double underscores as the
/// key path separator (e.g. `KEY_STORE__LOCATION`, `LIFETIMES__CODE_SECONDS`).
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config.yaml")
}

/// Same as [`load_config`] with an explicit file path. A missing file is
/// tolerated so that a pure environment configuration works.
pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name(path).required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    validate(&app)?;
    Ok(app)
}

pub fn validate(app: &AppConfig) -> Result<(), ConfigError> {
    if app.database_url.trim().is_empty() {
        return Err(ConfigError::Validation("database_url must not be empty".into()));
    }
    if app.issuer_url.trim().is_empty() {
        return Err(ConfigError::Validation("issuer_url must not be empty".into()));
    }
    let lifetimes = &app.lifetimes;
    for (name, value) in [
        ("lifetimes.code_seconds", lifetimes.code_seconds),
        ("lifetimes.access_token_seconds", lifetimes.access_token_seconds),
        ("lifetimes.id_token_seconds", lifetimes.id_token_seconds),
        ("lifetimes.consent_seconds", lifetimes.consent_seconds),
    ] {
        check_lifetime(name, value)?;
    }
    if let RefreshPolicyConfig::MaxAge { seconds } = app.refresh_policy {
        check_lifetime("refresh_policy.seconds", seconds)?;
    }
    Ok(())
}

fn check_lifetime(name: &str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::Validation(format!("{name} must be > 0")));
    }
    if value > MAX_LIFETIME_SECONDS {
        return Err(ConfigError::Validation(format!(
            "{name} must be <= {MAX_LIFETIME_SECONDS}"
        )));
    }
    Ok(())
}

/// Convenience helper for binaries wanting the panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}
