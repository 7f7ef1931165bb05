mod common;

use common::*;
use oidc_issuer::IssuerError;
use oidc_issuer::config::KeyStoreConfig;
use oidc_issuer::keys::migrate::{
    MigrationMode, MigrationSummary, migrate_database_keys, resolve_destination,
};
use oidc_issuer::keys::{BlobStore, DatabaseKeyStore, FilesystemKeyStore, KeyStore, compute_kid};

#[tokio::test]
async fn move_preserves_every_kid_and_empties_the_database() {
    let db = test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let source = DatabaseKeyStore::new(db.clone());
    let destination = FilesystemKeyStore::new(db.clone(), BlobStore::new(dir.path()));

    source.create(PKCS1_PEM).await.unwrap();
    source.create(OPENSSH).await.unwrap();
    source.create(PKCS8_DER).await.unwrap();

    let mut lines = Vec::new();
    let summary = migrate_database_keys(&source, &destination, MigrationMode::Move, |outcome| {
        lines.push(outcome.as_ref().map(ToString::to_string).unwrap())
    })
    .await
    .unwrap();

    assert_eq!(summary, MigrationSummary { migrated: 3, failed: 0 });
    assert!(source.keys().await.unwrap().is_empty());

    let mut expected: Vec<String> = [PKCS1_PEM, OPENSSH, PKCS8_DER]
        .iter()
        .map(|key| compute_kid(key))
        .collect();
    let mut migrated: Vec<String> = destination
        .keys()
        .await
        .unwrap()
        .into_iter()
        .map(|key| key.kid)
        .collect();
    expected.sort();
    migrated.sort();
    assert_eq!(migrated, expected);

    for kid in &expected {
        assert!(lines.contains(&format!("Moved key with kid: {kid}")));
    }
}

#[tokio::test]
async fn copy_leaves_source_keys() {
    let db = test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let source = DatabaseKeyStore::new(db.clone());
    let destination = FilesystemKeyStore::new(db.clone(), BlobStore::new(dir.path()));
    let original = source.create(PKCS8_PEM).await.unwrap();

    let mut lines = Vec::new();
    migrate_database_keys(&source, &destination, MigrationMode::Copy, |outcome| {
        lines.push(outcome.as_ref().map(ToString::to_string).unwrap())
    })
    .await
    .unwrap();

    assert_eq!(lines, vec![format!("Copied key with kid: {}", original.kid)]);
    assert_eq!(source.keys().await.unwrap(), vec![original.clone()]);
    let copied = destination.keys().await.unwrap();
    assert_eq!(copied.len(), 1);
    assert_eq!(copied[0].key, original.key);
}

#[tokio::test]
async fn per_key_failures_leave_the_source_untouched() {
    let db = test_db().await;
    let dir = tempfile::tempdir().unwrap();
    // A regular file where the key directory should be.
    let blocked = dir.path().join("not-a-dir");
    std::fs::write(&blocked, b"").unwrap();

    let source = DatabaseKeyStore::new(db.clone());
    let destination = FilesystemKeyStore::new(db.clone(), BlobStore::new(&blocked));
    source.create(PKCS1_PEM).await.unwrap();
    source.create(OPENSSH).await.unwrap();

    let mut failures = Vec::new();
    let summary = migrate_database_keys(&source, &destination, MigrationMode::Move, |outcome| {
        if let Err(failure) = outcome {
            failures.push(failure.kid.clone());
        }
    })
    .await
    .unwrap();

    assert_eq!(summary, MigrationSummary { migrated: 0, failed: 2 });
    assert_eq!(failures.len(), 2);
    assert_eq!(source.keys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn empty_database_migrates_nothing() {
    let db = test_db().await;
    let dir = tempfile::tempdir().unwrap();
    let source = DatabaseKeyStore::new(db.clone());
    let destination = FilesystemKeyStore::new(db.clone(), BlobStore::new(dir.path()));

    let summary = migrate_database_keys(&source, &destination, MigrationMode::Move, |_| {
        panic!("nothing to report")
    })
    .await
    .unwrap();
    assert_eq!(summary, MigrationSummary::default());
}

#[test]
fn unconfigured_destination_needs_override() {
    let config = KeyStoreConfig::default();
    let err = resolve_destination(&config, false).unwrap_err();
    assert!(matches!(err, IssuerError::MisconfiguredStorage(_)));
    assert!(err.to_string().contains("--ignore-unconfigured-destination"));

    let fallback = resolve_destination(&config, true).unwrap();
    assert_eq!(fallback, std::env::current_dir().unwrap());
}

#[test]
fn configured_destination_is_used() {
    let config = KeyStoreConfig {
        backend: "database".into(),
        location: Some("/var/lib/oidc/keys".into()),
    };
    assert_eq!(
        resolve_destination(&config, false).unwrap(),
        std::path::PathBuf::from("/var/lib/oidc/keys")
    );
}
