//! # Upload Storage
//!
//! Stores uploaded document bytes under the configured upload root:
//!
//! ```text
//! <root>/applications/<applicant_id>/<application_id>/<random>.<ext>
//! ```
//!
//! Every stored file gets a fresh name, so replacing a document never
//! overwrites the previous bytes. The caller removes the old file once
//! the replacement has been committed.

use std::path::{Path, PathBuf};

use admit_core::{ApplicationId, UserId};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("refusing to touch path outside the upload root: {0}")]
    OutsideRoot(String),
}

/// A file written by [`FileStorage::store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Path relative to the upload root, always `/`-separated.
    pub relative_path: String,
    pub size: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

/// Filesystem-backed document storage.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` for one application under a fresh file name.
    pub async fn store(
        &self,
        applicant_id: UserId,
        application_id: ApplicationId,
        extension: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let relative_path = format!(
            "applications/{applicant_id}/{application_id}/{}.{extension}",
            Uuid::new_v4().simple()
        );
        let path = self.resolve(&relative_path)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Write {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(path = %relative_path, size = bytes.len(), "stored upload");
        Ok(StoredFile {
            relative_path,
            size: bytes.len() as u64,
            sha256: sha256_hex(bytes),
        })
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, relative_path: &str) -> Result<(), StorageError> {
        let path = self.resolve(relative_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Remove { path, source }),
        }
    }

    /// Read a stored file back.
    pub async fn read(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative_path)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| StorageError::Read { path, source })
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, StorageError> {
        let escapes = Path::new(relative_path).components().any(|c| {
            !matches!(c, std::path::Component::Normal(_))
        });
        if escapes {
            return Err(StorageError::OutsideRoot(relative_path.to_string()));
        }
        Ok(self.root.join(relative_path))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
