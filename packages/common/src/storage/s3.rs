use std::io::Cursor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::request::ResponseData;
use s3::{Bucket, Region};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::error::StorageError;
use super::key::{KEY_PREFIX, StorageKey};
use super::traits::{BlobInfo, BlobStore, BoxReader};
use crate::config::S3Config;

/// Blob store backed by an S3-compatible bucket.
///
/// Keys are used verbatim as object names.
pub struct S3BlobStore {
    bucket: Box<Bucket>,
    max_size: u64,
}

impl S3BlobStore {
    pub fn new(config: &S3Config, max_size: u64) -> Result<Self, StorageError> {
        let region = match &config.endpoint {
            Some(endpoint) => Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.clone(),
            },
            None => config
                .region
                .parse()
                .map_err(|e| StorageError::Backend(format!("invalid region: {e}")))?,
        };

        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Backend(format!("invalid credentials: {e}")))?;

        let mut bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if config.path_style {
            bucket = bucket.with_path_style();
        }

        Ok(Self { bucket, max_size })
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

/// Without `fail-on-err`, rust-s3 returns non-2xx responses as `Ok`.
fn check_status(response: ResponseData, key: &StorageKey) -> Result<ResponseData, StorageError> {
    match response.status_code() {
        200..=299 => Ok(response),
        404 => Err(StorageError::NotFound(key.to_string())),
        code => Err(StorageError::Backend(format!(
            "unexpected status {code} for {key}"
        ))),
    }
}

fn map_s3_error(err: S3Error, key: &StorageKey) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(key.to_string()),
        other => StorageError::Backend(other.to_string()),
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &StorageKey, data: &[u8]) -> Result<(), StorageError> {
        self.check_size(data.len() as u64)?;
        let response = self
            .bucket
            .put_object(key.to_string(), data)
            .await
            .map_err(|e| map_s3_error(e, key))?;
        check_status(response, key)?;
        Ok(())
    }

    async fn put_stream(
        &self,
        key: &StorageKey,
        reader: BoxReader,
    ) -> Result<u64, StorageError> {
        let mut data = Vec::new();
        let mut limited = reader.take(self.max_size.saturating_add(1));
        limited.read_to_end(&mut data).await?;
        self.put(key, &data).await?;
        Ok(data.len() as u64)
    }

    async fn get(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(key.to_string())
            .await
            .map_err(|e| map_s3_error(e, key))?;
        Ok(check_status(response, key)?.bytes().to_vec())
    }

    async fn get_stream(&self, key: &StorageKey) -> Result<BoxReader, StorageError> {
        let data = self.get(key).await?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        match self.bucket.head_object(key.to_string()).await {
            Ok((_, 200..=299)) => Ok(true),
            Ok((_, 404)) | Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Ok((_, code)) => Err(StorageError::Backend(format!(
                "unexpected status {code} for {key}"
            ))),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn delete(&self, key: &StorageKey) -> Result<bool, StorageError> {
        // S3 deletes succeed for missing objects, so probe first.
        if !self.exists(key).await? {
            return Ok(false);
        }
        let response = self
            .bucket
            .delete_object(key.to_string())
            .await
            .map_err(|e| map_s3_error(e, key))?;
        match check_status(response, key) {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn size(&self, key: &StorageKey) -> Result<u64, StorageError> {
        let (head, code) = self
            .bucket
            .head_object(key.to_string())
            .await
            .map_err(|e| map_s3_error(e, key))?;
        match code {
            200..=299 => Ok(head.content_length.unwrap_or(0).max(0) as u64),
            404 => Err(StorageError::NotFound(key.to_string())),
            code => Err(StorageError::Backend(format!(
                "unexpected status {code} for {key}"
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<BlobInfo>, StorageError> {
        let pages = self
            .bucket
            .list(format!("{KEY_PREFIX}/"), None)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut infos = Vec::new();
        for object in pages.into_iter().flat_map(|page| page.contents) {
            let key = match StorageKey::parse(&object.key) {
                Ok(key) => key,
                Err(e) => {
                    debug!("Skipping foreign object in bucket: {e}");
                    continue;
                }
            };
            let last_modified = DateTime::parse_from_rfc3339(&object.last_modified)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|e| {
                    StorageError::Backend(format!(
                        "unparseable LastModified {:?}: {e}",
                        object.last_modified
                    ))
                })?;
            infos.push(BlobInfo {
                key,
                size: object.size,
                last_modified,
            });
        }

        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}
