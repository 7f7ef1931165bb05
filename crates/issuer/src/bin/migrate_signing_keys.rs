use clap::Parser;
use oidc_issuer::config::load_config_from;
use oidc_issuer::keys::migrate::{MigrationMode, migrate_database_keys, resolve_destination};
use oidc_issuer::keys::{BlobStore, DatabaseKeyStore, FilesystemKeyStore};
use sea_orm::Database;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Move RSA signing keys stored in the database into the filesystem key store.
#[derive(Parser)]
#[command(name = "migrate-signing-keys")]
#[command(version)]
struct Cli {
    /// Keep the database keys instead of deleting them after copying
    #[arg(long)]
    copy: bool,

    /// Use the current directory when key_store.location is not configured
    #[arg(long)]
    ignore_unconfigured_destination: bool,

    /// Configuration file
    #[arg(long, env = "OIDC_ISSUER_CONFIG", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<ExitCode> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oidc_issuer=warn"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;

    let destination_root =
        match resolve_destination(&config.key_store, cli.ignore_unconfigured_destination) {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{e}");
                return Ok(ExitCode::FAILURE);
            }
        };

    let db = Arc::new(Database::connect(&config.database_url).await?);
    let source = DatabaseKeyStore::new(db.clone());
    let destination = FilesystemKeyStore::new(db, BlobStore::new(destination_root));
    let mode = if cli.copy {
        MigrationMode::Copy
    } else {
        MigrationMode::Move
    };

    let summary = migrate_database_keys(&source, &destination, mode, |outcome| match outcome {
        Ok(migrated) => println!("{migrated}"),
        Err(failure) => eprintln!("{failure}"),
    })
    .await?;

    if summary.failed > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
