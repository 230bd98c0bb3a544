//! Blob storage for uploaded CSV files
//!
//! `FsBlobStore` keeps one file per object under a root directory. Keys are
//! flat: anything that could escape the root is rejected. Each object's etag
//! is written next to it as `.{key}.etag`, so listing never rehashes bodies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum objects returned by a single `list`
pub const LIST_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Metadata of a stored object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
    pub uploaded: DateTime<Utc>,
    pub etag: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: &[u8]) -> Result<StoredObject, StorageError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Up to `LIST_LIMIT` objects, sorted by key
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>, StorageError>;

    /// Remove an object; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

fn etag(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Filesystem-backed blob store
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let invalid = key.trim().is_empty()
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
            || key.starts_with('.');

        if invalid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    /// Keys never start with `.`, so sidecars cannot collide with objects
    fn etag_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{}.etag", key))
    }

    async fn stored_etag(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        match tokio::fs::read_to_string(self.etag_path(key)).await {
            Ok(tag) if !tag.trim().is_empty() => Ok(tag.trim().to_string()),
            Ok(_) => self.rehash(key, path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => self.rehash(key, path).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Objects written without a sidecar get one on first listing
    async fn rehash(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let tag = etag(&tokio::fs::read(path).await?);
        if let Err(e) = tokio::fs::write(self.etag_path(key), &tag).await {
            warn!("Failed to write etag for {}: {}", key, e);
        }
        Ok(tag)
    }

    async fn describe(&self, key: &str, path: &Path) -> Result<StoredObject, StorageError> {
        let metadata = tokio::fs::metadata(path).await?;
        let uploaded = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(StoredObject {
            key: key.to_string(),
            size: metadata.len(),
            uploaded,
            etag: self.stored_etag(key, path).await?,
        })
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, body: &[u8]) -> Result<StoredObject, StorageError> {
        let path = self.path_for(key)?;
        let tag = etag(body);
        tokio::fs::write(&path, body).await?;
        tokio::fs::write(self.etag_path(key), &tag).await?;
        debug!("Stored {} ({} bytes)", key, body.len());

        Ok(StoredObject {
            key: key.to_string(),
            size: body.len() as u64,
            uploaded: Utc::now(),
            etag: tag,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredObject>, StorageError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Ok(key) = entry.file_name().into_string() else {
                continue;
            };
            if key.starts_with('.') {
                continue;
            }
            if prefix.map_or(true, |p| key.starts_with(p)) {
                keys.push(key);
            }
        }

        keys.sort();
        keys.truncate(LIST_LIMIT);

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            let path = self.root.join(&key);
            match self.describe(&key, &path).await {
                Ok(object) => objects.push(object),
                // Deleted between read_dir and describe
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(objects)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        for target in [path, self.etag_path(key)] {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FsBlobStore) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::open(dir.path().join("blobs")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (_dir, store) = store().await;
        let csv = b"EmailAddress,Password\na@example.com,secret\n";

        let object = store.put("1700-email-list-1700.csv", csv).await.unwrap();
        assert_eq!(object.size, csv.len() as u64);
        assert_eq!(object.etag.len(), 64);

        let body = store.get("1700-email-list-1700.csv").await.unwrap();
        assert_eq!(body.as_deref(), Some(&csv[..]));

        store.delete("1700-email-list-1700.csv").await.unwrap();
        assert!(store.get("1700-email-list-1700.csv").await.unwrap().is_none());
        store.delete("1700-email-list-1700.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let (_dir, store) = store().await;
        store.put("b.csv", b"b").await.unwrap();
        store.put("a.csv", b"a").await.unwrap();
        store.put("other.txt", b"x").await.unwrap();

        let all = store.list(None).await.unwrap();
        let keys: Vec<_> = all.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, vec!["a.csv", "b.csv", "other.txt"]);

        let filtered = store.list(Some("o")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].etag, etag(b"x"));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let (_dir, store) = store().await;

        for key in ["../secrets", "nested/key.csv", "..\\win", "", ".hidden"] {
            assert!(
                matches!(store.put(key, b"x").await, Err(StorageError::InvalidKey(_))),
                "key {:?} should be rejected",
                key
            );
        }
    }

    #[tokio::test]
    async fn test_list_uses_stored_etag() {
        let (dir, store) = store().await;
        let object = store.put("list.csv", b"original").await.unwrap();

        // Rewritten behind the store's back: the recorded etag still wins
        tokio::fs::write(dir.path().join("blobs").join("list.csv"), b"changed")
            .await
            .unwrap();

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].etag, object.etag);
        assert_eq!(listed[0].size, b"changed".len() as u64);
    }

    #[tokio::test]
    async fn test_missing_sidecar_is_rebuilt() {
        let (dir, store) = store().await;
        let root = dir.path().join("blobs");
        tokio::fs::write(root.join("legacy.csv"), b"legacy").await.unwrap();

        let listed = store.list(None).await.unwrap();
        assert_eq!(listed[0].etag, etag(b"legacy"));
        assert!(root.join(".legacy.csv.etag").exists());

        store.delete("legacy.csv").await.unwrap();
        assert!(!root.join(".legacy.csv.etag").exists());
        assert!(store.list(None).await.unwrap().is_empty());
    }
}
