use crate::constants::STAGING_PREFIX;
use crate::names::is_valid_name;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Blob not found")]
    NotFound,

    #[error("Name already taken: {0}")]
    Collision(String),

    #[error("Invalid blob name")]
    InvalidName,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat, write-once blob storage keyed by name.
pub trait BlobStore: Send + Sync {
    fn exists(&self, name: &str) -> bool;

    /// Persist `data` under `name`, failing with [`StoreError::Collision`] if
    /// the name is already taken. Never overwrites.
    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError>;

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// One file per blob, named after the blob, directly inside `base_path`.
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) the data directory and clear out staging
    /// files a previous process left behind.
    pub fn open(base_path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_path = base_path.into();
        fs::create_dir_all(&base_path)?;
        if !fs::metadata(&base_path)?.is_dir() {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not a directory", base_path.display()),
            ));
        }

        let store = Self { base_path };
        let removed = store.remove_stale_staging()?;
        if removed > 0 {
            tracing::info!("Removed {} stale staging files", removed);
        }
        Ok(store)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_valid_name(name) {
            return Err(StoreError::InvalidName);
        }
        Ok(self.base_path.join(name))
    }

    fn remove_stale_staging(&self) -> std::io::Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.base_path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_staging(&self, staging: &Path, data: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(staging)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn exists(&self, name: &str) -> bool {
        match self.blob_path(name) {
            Ok(path) => fs::metadata(path).map(|m| m.is_file()).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let target = self.blob_path(name)?;
        let staging = self
            .base_path
            .join(format!("{}{}", STAGING_PREFIX, uuid::Uuid::new_v4()));

        // Fully written content appears under the final name in one step;
        // hard_link refuses to replace an existing file.
        let result = self
            .write_staging(&staging, data)
            .and_then(|()| fs::hard_link(&staging, &target));

        if let Err(e) = fs::remove_file(&staging) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove staging file {}: {}", staging.display(), e);
            }
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Collision(name.to_string()))
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(name)?;
        match fs::read(path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}
