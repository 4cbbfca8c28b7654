use std::io::Cursor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::io::AsyncReadExt;

use super::error::StorageError;
use super::key::StorageKey;
use super::traits::{BlobInfo, BlobStore, BoxReader};

struct MemoryBlob {
    data: Vec<u8>,
    stored_at: DateTime<Utc>,
}

/// In-memory blob store for tests and embedding.
pub struct InMemoryBlobStore {
    blobs: DashMap<StorageKey, MemoryBlob>,
    max_size: u64,
}

impl InMemoryBlobStore {
    pub fn new(max_size: u64) -> Self {
        Self {
            blobs: DashMap::new(),
            max_size,
        }
    }

    /// Number of blobs currently stored.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<StorageKey> {
        let mut keys: Vec<StorageKey> = self.blobs.iter().map(|e| *e.key()).collect();
        keys.sort();
        keys
    }

    fn check_size(&self, len: u64) -> Result<(), StorageError> {
        if len > self.max_size {
            return Err(StorageError::SizeLimitExceeded {
                actual: len,
                limit: self.max_size,
            });
        }
        Ok(())
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new(u64::MAX)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        self.check_size(data.len() as u64)?;
        self.blobs.insert(
            *key,
            MemoryBlob {
                data: data.to_vec(),
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn put_stream(
        &self,
        key: &StorageKey,
        reader: BoxReader,
    ) -> Result<u64, StorageError> {
        let mut data = Vec::new();
        // One byte past the limit is enough to know it was exceeded.
        let mut limited = reader.take(self.max_size.saturating_add(1));
        limited.read_to_end(&mut data).await?;
        let len = data.len() as u64;
        self.check_size(len)?;
        self.blobs.insert(
            *key,
            MemoryBlob {
                data,
                stored_at: Utc::now(),
            },
        );
        Ok(len)
    }

    async fn get(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let data = self.get(key).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(self.blobs.contains_key(key))
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(self.blobs.remove(key).is_some())
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        self.blobs
            .get(key)
            .map(|blob| blob.data.len() as u64)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let mut infos: Vec<BlobInfo> = self
            .blobs
            .iter()
            .map(|entry| BlobInfo {
                key: *entry.key(),
                size: entry.value().data.len() as u64,
                last_modified: entry.value().stored_at,
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}
