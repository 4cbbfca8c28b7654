use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use super::error::StorageError;
use super::key::{KEY_PREFIX, StorageKey};
use super::traits::{BlobInfo, BlobStore, BoxReader};

const TEMP_DIR: &str = ".tmp";

/// Filesystem-backed blob store.
///
/// Each key maps to `{base_path}/documents/{document id}/{revision}`. Writes
/// land in `{base_path}/.tmp` first and are renamed into place, so a reader
/// never observes a half-written blob under its key.
///
/// Per-document directories are never removed by `delete`: a concurrent
/// write for another revision of the same document may be about to rename
/// into them. Empty ones are pruned by [`BlobStore::purge_incomplete`].
pub struct FilesystemBlobStore {
    base_path: PathBuf,
    max_size: u64,
}

impl FilesystemBlobStore {
    /// Create a new filesystem blob store.
    pub async fn new(base_path: PathBuf, max_size: u64) -> Result<Self, StorageError> {
        fs::create_dir_all(base_path.join(KEY_PREFIX)).await?;
        fs::create_dir_all(base_path.join(TEMP_DIR)).await?;
        Ok(Self {
            base_path,
            max_size,
        })
    }

    /// Compute the filesystem path for a given key.
    fn blob_path(&self, key: &StorageKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.extend(key.segments());
        path
    }

    /// Fresh temp file path, removed on drop unless kept.
    fn temp_path(&self) -> TempPath {
        TempPath::from_path(
            self.base_path
                .join(TEMP_DIR)
                .join(uuid::Uuid::new_v4().to_string()),
        )
    }

    async fn write_temp(&self, reader: &mut BoxReader, temp_path: &Path) -> Result<u64, StorageError> {
        let mut total_bytes: u64 = 0;
        let mut buf = vec![0u8; 64 * 1024]; // 64KB read buffer
        let mut temp_file = fs::File::create(temp_path).await?;

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }

            total_bytes += n as u64;
            if total_bytes > self.max_size {
                return Err(StorageError::SizeLimitExceeded {
                    actual: total_bytes,
                    limit: self.max_size,
                });
            }

            temp_file.write_all(&buf[..n]).await?;
        }

        temp_file.flush().await?;
        temp_file.sync_all().await?;
        Ok(total_bytes)
    }

    /// Rename a finished temp file to its final path.
    ///
    /// The document directory can be pruned between `create_dir_all` and
    /// `rename`; the rename is retried once against a recreated directory.
    async fn move_into_place(&self, temp_path: &Path, blob_path: &Path) -> Result<(), StorageError> {
        let mut retried = false;
        loop {
            if let Some(parent) = blob_path.parent() {
                fs::create_dir_all(parent).await?;
            }
            match fs::rename(temp_path, blob_path).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound && !retried => {
                    debug!(path = %blob_path.display(), "Blob directory vanished, retrying rename");
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Whether a directory entry was last modified before `cutoff`.
async fn modified_before(entry: &fs::DirEntry, cutoff: DateTime<Utc>) -> Result<bool, StorageError> {
    let modified: DateTime<Utc> = entry.metadata().await?.modified()?.into();
    Ok(modified < cutoff)
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put_stream(
        &self,
        key: &StorageKey,
        mut reader: BoxReader,
    ) -> Result<u64, StorageError> {
        // Dropping `temp` deletes the file, so an error or a cancelled
        // future never leaves a partial write behind.
        let temp = self.temp_path();
        let written = self.write_temp(&mut reader, &temp).await?;

        let blob_path = self.blob_path(key);
        self.move_into_place(&temp, &blob_path).await?;

        // The file now lives under its key; only disarm the guard.
        let _ = temp.keep();
        Ok(written)
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let blob_path = self.blob_path(key);
        match fs::File::open(&blob_path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        Ok(fs::try_exists(self.blob_path(key)).await?)
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        match fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        match fs::metadata(self.blob_path(key)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let mut infos = Vec::new();
        let mut documents = fs::read_dir(self.base_path.join(KEY_PREFIX)).await?;

        while let Some(doc_dir) = documents.next_entry().await? {
            if !doc_dir.file_type().await?.is_dir() {
                continue;
            }
            let Some(doc_name) = doc_dir.file_name().to_str().map(str::to_owned) else {
                continue;
            };

            let mut revisions = fs::read_dir(doc_dir.path()).await?;
            while let Some(entry) = revisions.next_entry().await? {
                let Some(rev_name) = entry.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                let raw = format!("{KEY_PREFIX}/{doc_name}/{rev_name}");
                let key = match StorageKey::parse(&raw) {
                    Ok(key) => key,
                    Err(e) => {
                        debug!("Skipping foreign file in blob directory: {e}");
                        continue;
                    }
                };
                let meta = entry.metadata().await?;
                if !meta.is_file() {
                    continue;
                }
                let last_modified: DateTime<Utc> = meta.modified()?.into();
                infos.push(BlobInfo {
                    key,
                    size: meta.len(),
                    last_modified,
                });
            }
        }

        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    async fn purge_incomplete(&self, older_than: DateTime<Utc>) -> Result<usize, StorageError> {
        // Temp files left by a crash mid-write. A live write keeps bumping
        // its file's mtime, so only stalled ones fall behind the cutoff.
        let mut removed = 0;
        let mut temps = fs::read_dir(self.base_path.join(TEMP_DIR)).await?;
        while let Some(entry) = temps.next_entry().await? {
            if !modified_before(&entry, older_than).await? {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %entry.path().display(), "Failed to remove stale temp file: {e}"),
            }
        }

        // Document directories emptied by deletes. `remove_dir` refuses
        // non-empty ones, and a racing write recreates the directory.
        let mut documents = fs::read_dir(self.base_path.join(KEY_PREFIX)).await?;
        while let Some(entry) = documents.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && modified_before(&entry, older_than).await?
                && fs::remove_dir(entry.path()).await.is_ok()
            {
                debug!(path = %entry.path().display(), "Pruned empty document directory");
            }
        }

        Ok(removed)
    }
}
