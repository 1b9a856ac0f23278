//! Persistent key-value storage behind the caches
//!
//! Each cache serializes its whole map into one blob stored under one key.
//! [`FileStore`] keeps one file per key inside a base directory;
//! [`MemoryStore`] is used in tests and for throwaway runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{CacheError, CacheResult};
use crate::utils::url::UrlUtils;

/// Byte-oriented persistent store addressed by string keys
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a blob; `Ok(None)` when the key was never written
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`
    async fn persist(&self, key: &str, bytes: &[u8]) -> CacheResult<()>;

    /// Delete the blob; missing keys are not an error
    async fn remove(&self, key: &str) -> CacheResult<()>;
}

/// One file per key under `base_dir`
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create the store, making sure the base directory exists
    pub async fn open<P: Into<PathBuf>>(base_dir: P) -> CacheResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| CacheError::store(base_dir.display().to_string(), e.to_string()))?;
        Ok(Self { base_dir })
    }

    /// Keys are hashed so arbitrary strings never escape the base directory
    fn path_for(&self, key: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.json", UrlUtils::storage_id(key)))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::store(key, e.to_string())),
        }
    }

    async fn persist(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        let base_dir = self.base_dir.clone();
        let path = self.path_for(key);
        let blob = bytes.to_vec();

        // Unique temp file then rename, so concurrent writers never share a
        // scratch path and a crash never leaves a half-written blob
        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&base_dir)?;
            tmp.write_all(&blob)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::store(key, e.to_string()))?
        .map_err(|e| CacheError::store(key, e.to_string()))?;

        debug!("Persisted {} bytes for key {}", bytes.len(), key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::store(key, e.to_string())),
        }
    }
}

/// In-process store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys written so far
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(self.blobs.read().await.get(key).cloned())
    }

    async fn persist(&self, key: &str, bytes: &[u8]) -> CacheResult<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
