use oidc_issuer::AppResources;
use oidc_issuer::config::load_config_or_panic;
use oidc_issuer::oidc::IssuerState;
use oidc_issuer::sweep::spawn_expiry_sweep;
use sea_orm::Database;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "oidc_issuer=info,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    initialize_standard_tracing();

    let config = Arc::new(load_config_or_panic());
    let db = Arc::new(Database::connect(&config.database_url).await?);
    let resources = AppResources { db, config };

    // Key store misconfiguration stops the process here, before anything is issued.
    let state = Arc::new(IssuerState::from_config(
        resources.db.clone(),
        &resources.config,
    )?);
    tracing::info!(
        issuer = %resources.config.issuer_url,
        backend = state.key_store.backend().as_str(),
        sweep_interval_seconds = resources.config.sweep_interval_seconds,
        "Issuer ready"
    );

    let sweep = spawn_expiry_sweep(
        state.clone(),
        Duration::from_secs(resources.config.sweep_interval_seconds),
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    if let Some(handle) = sweep {
        handle.abort();
    }
    Ok(())
}
