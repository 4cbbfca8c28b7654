use std::io::Cursor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;
use super::key::StorageKey;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// A blob as reported by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: StorageKey,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Key-addressed blob storage.
///
/// Implementations only guarantee single-key atomicity: a blob is either fully
/// visible under its key or not at all. Ordering across keys, and against the
/// metadata store, is the caller's job.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`, replacing any previous content.
    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        let reader: BoxReader = Box::new(Cursor::new(data.to_vec()));
        self.put_stream(key, reader).await.map(|_| ())
    }

    /// Store data from an async reader under `key`. Returns the number of bytes written.
    async fn put_stream(&self, key: &StorageKey, reader: BoxReader) -> Result<u64, StorageError>;

    /// Retrieve all bytes stored under `key`.
    async fn get(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let mut reader = self.get_stream(key).await?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Retrieve a blob as a streaming async reader.
    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError>;

    /// Check whether a blob exists.
    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Delete a blob.
    ///
    /// Returns `true` if the blob was deleted, `false` if it did not exist.
    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError>;

    /// Get the size of a blob in bytes.
    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError>;

    /// Enumerate every blob in the store.
    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError>;

    /// Remove leftovers of writes that never completed and were last touched
    /// before `older_than`. Returns how many were removed.
    ///
    /// Backends without staging areas have nothing to purge.
    async fn purge_incomplete(&self, _older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        Ok(0)
    }
}
