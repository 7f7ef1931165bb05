//! One-shot migration of database-backed keys into the filesystem backend.
//!
//! Key bytes are copied unchanged so every `kid` survives the move. Each key is
//! handled on its own: a failure is reported for that key and the batch goes
//! on. For a single key the destination is written and verified before the
//! source is touched.

use super::{DatabaseKeyStore, FilesystemKeyStore, KeyStore, SigningKey};
use crate::config::KeyStoreConfig;
use crate::error::IssuerError;
use std::fmt;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MigrationMode {
    /// Leave the database rows in place.
    Copy,
    /// Delete each database row once its file copy is verified.
    Move,
}

impl MigrationMode {
    pub fn past_tense(&self) -> &'static str {
        match self {
            MigrationMode::Copy => "Copied",
            MigrationMode::Move => "Moved",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigratedKey {
    pub source_id: String,
    pub destination_id: String,
    pub kid: String,
    pub mode: MigrationMode,
}

impl fmt::Display for MigratedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} key with kid: {}", self.mode.past_tense(), self.kid)
    }
}

#[derive(Debug)]
pub struct KeyMigrationFailure {
    pub source_id: String,
    pub kid: String,
    pub error: IssuerError,
}

impl fmt::Display for KeyMigrationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to migrate key with kid: {} ({})",
            self.kid, self.error
        )
    }
}

pub type KeyMigrationOutcome = Result<MigratedKey, KeyMigrationFailure>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    pub migrated: usize,
    pub failed: usize,
}

/// Resolve the destination directory. An unconfigured destination is refused
/// unless `ignore_unconfigured` is set, in which case the current directory is
/// used.
pub fn resolve_destination(
    config: &KeyStoreConfig,
    ignore_unconfigured: bool,
) -> Result<PathBuf, IssuerError> {
    match config.filesystem_location() {
        Ok(path) => Ok(path.to_path_buf()),
        Err(_) if ignore_unconfigured => Ok(std::env::current_dir()?),
        Err(_) => Err(IssuerError::MisconfiguredStorage(
            "key_store.location not set. You should set this to a writable directory before \
             running this command, or bypass this check with --ignore-unconfigured-destination"
                .into(),
        )),
    }
}

/// Migrate every database key into `destination`, calling `report` once per
/// key as soon as its outcome is known. Only failing to list the source keys
/// aborts the run.
pub async fn migrate_database_keys<F>(
    source: &DatabaseKeyStore,
    destination: &FilesystemKeyStore,
    mode: MigrationMode,
    mut report: F,
) -> Result<MigrationSummary, IssuerError>
where
    F: FnMut(&KeyMigrationOutcome),
{
    let mut summary = MigrationSummary::default();

    for key in source.keys().await? {
        let outcome = migrate_one(source, destination, mode, key).await;
        match &outcome {
            Ok(migrated) => {
                tracing::info!(kid = %migrated.kid, mode = ?mode, "Migrated signing key");
                summary.migrated += 1;
            }
            Err(failure) => {
                tracing::error!(kid = %failure.kid, "Signing key migration failed: {}", failure.error);
                summary.failed += 1;
            }
        }
        report(&outcome);
    }

    Ok(summary)
}

async fn migrate_one(
    source: &DatabaseKeyStore,
    destination: &FilesystemKeyStore,
    mode: MigrationMode,
    key: SigningKey,
) -> KeyMigrationOutcome {
    let fail = |error: IssuerError| KeyMigrationFailure {
        source_id: key.id.clone(),
        kid: key.kid.clone(),
        error,
    };

    let created = destination.create(&key.key).await.map_err(fail)?;

    // Read the file back; a copy whose bytes drifted would carry another kid.
    let verified = match destination.key(&created.id).await {
        Ok(Some(read_back)) if read_back.kid == key.kid => read_back,
        Ok(_) => {
            let _ = destination.remove(&created.id).await;
            return Err(fail(IssuerError::Validation(
                "key read back from the filesystem does not match the source bytes".into(),
            )));
        }
        Err(e) => {
            let _ = destination.remove(&created.id).await;
            return Err(fail(e));
        }
    };

    if mode == MigrationMode::Move {
        match source.remove(&key.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(kid = %key.kid, "Source key vanished during migration");
            }
            Err(e) => {
                // Copy stays valid; keep the source too rather than lose the key.
                return Err(fail(e));
            }
        }
    }

    Ok(MigratedKey {
        source_id: key.id.clone(),
        destination_id: verified.id,
        kid: verified.kid,
        mode,
    })
}
