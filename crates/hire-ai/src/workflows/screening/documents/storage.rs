use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::workflows::screening::domain::{ApplicantId, CvFileId};

/// Failures of the raw document byte store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no stored document under '{0}'")]
    NotFound(String),
    #[error("storage key '{0}' is not a relative path")]
    InvalidKey(String),
    #[error("storage i/o failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Key under which the bytes of a CV file are stored.
pub fn storage_key(applicant_id: ApplicantId, file_id: CvFileId, extension: &str) -> String {
    if extension.is_empty() {
        format!("cv/{applicant_id}/{file_id}")
    } else {
        format!("cv/{applicant_id}/{file_id}.{extension}")
    }
}

/// Byte storage for uploaded documents, addressed by relative key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Stores each document as a file below a base directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    base_path: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let well_formed = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !well_formed {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    /// Write, read back and remove a check file so a bad mount fails at startup.
    pub async fn validate(&self) -> Result<(), StorageError> {
        let key = ".health-check/check.bin";
        let marker = b"storage-health-check";
        self.put(key, marker).await?;
        let read_back = self.get(key).await?;
        self.delete(key).await?;
        let _ = fs::remove_dir(self.base_path.join(".health-check")).await;

        if read_back != marker {
            return Err(StorageError::Io {
                key: key.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, "read-back mismatch"),
            });
        }
        Ok(())
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_string(),
        source,
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        debug!(storage_key = %key, path = %path.display(), size = bytes.len(), "writing document bytes");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io_error(key))?;
        }

        // Readers never observe a half-written file.
        let temp_path = path.with_extension("part");
        let mut file = fs::File::create(&temp_path).await.map_err(io_error(key))?;
        file.write_all(bytes).await.map_err(io_error(key))?;
        file.sync_all().await.map_err(io_error(key))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            warn!(storage_key = %key, error = %err, "rename of staged document failed");
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(key)(err));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(err) => Err(io_error(key)(err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error(key)(err)),
        }
    }
}

/// In-process store for tests and demos.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .lock()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }
}

fn poisoned(key: &str) -> StorageError {
    StorageError::Io {
        key: key.to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, "blob store lock poisoned"),
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().map_err(|_| poisoned(key))?;
        blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let blobs = self.blobs.lock().map_err(|_| poisoned(key))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().map_err(|_| poisoned(key))?;
        blobs.remove(key);
        Ok(())
    }
}
