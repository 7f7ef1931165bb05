//! Blob store for key files.
//!
//! Files are written to a temporary name and then linked into place, so a
//! reader opening a locator sees either nothing or the complete key. Key files
//! are readable and writable by the owner only.

use crate::error::IssuerError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

#[derive(Clone, Debug)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `bytes` under `name` and return the locator. If `name` is taken a
    /// random suffix is appended; existing files are never overwritten.
    pub async fn put(&self, name: &str, bytes: &[u8]) -> Result<String, IssuerError> {
        check_locator(name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let tmp_path = self
            .root
            .join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = write_private_file(&tmp_path, bytes).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        let mut locator = name.to_string();
        let result = loop {
            match tokio::fs::hard_link(&tmp_path, self.root.join(&locator)).await {
                Ok(()) => break Ok(locator),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let suffix = uuid::Uuid::new_v4().simple().to_string();
                    locator = format!("{name}_{}", &suffix[..7]);
                }
                Err(e) => break Err(IssuerError::from(e)),
            }
        };
        let _ = tokio::fs::remove_file(&tmp_path).await;
        result
    }

    /// Read the whole blob. Each call opens the file anew and closes it before
    /// returning.
    pub async fn open(&self, locator: &str) -> Result<Vec<u8>, IssuerError> {
        let path = self.path_for(locator)?;
        Ok(tokio::fs::read(path).await?)
    }

    /// Remove a blob. Removing a missing blob is not an error.
    pub async fn delete(&self, locator: &str) -> Result<(), IssuerError> {
        let path = self.path_for(locator)?;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn path_for(&self, locator: &str) -> Result<PathBuf, IssuerError> {
        check_locator(locator)?;
        Ok(self.root.join(locator))
    }
}

/// Locators are bare file names inside the store root.
fn check_locator(locator: &str) -> Result<(), IssuerError> {
    if locator.is_empty()
        || locator.starts_with('.')
        || locator.contains(['/', '\\', '\0'])
    {
        return Err(IssuerError::Validation(format!(
            "invalid blob locator {locator:?}"
        )));
    }
    Ok(())
}

async fn write_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}
