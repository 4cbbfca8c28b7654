mod error;
mod hash;
mod key;
mod traits;

pub mod filesystem;
pub mod memory;
#[cfg(feature = "object-storage")]
pub mod s3;

use std::sync::Arc;

pub use error::StorageError;
pub use hash::ContentHash;
pub use key::{KEY_PREFIX, StorageKey};
pub use traits::{BlobInfo, BlobStore, BoxReader};

use crate::config::{StorageBackend, StorageConfig};

/// Open the blob store selected by `config.backend`.
pub async fn open_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, StorageError> {
    match config.backend {
        StorageBackend::Filesystem => {
            let store =
                filesystem::FilesystemBlobStore::new(config.path.clone(), config.max_blob_size)
                    .await?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "object-storage")]
        StorageBackend::S3 => {
            let s3_config = config.s3.as_ref().ok_or_else(|| {
                StorageError::Backend("storage.backend = \"s3\" requires a [storage.s3] section".into())
            })?;
            Ok(Arc::new(s3::S3BlobStore::new(s3_config, config.max_blob_size)?))
        }
        #[cfg(not(feature = "object-storage"))]
        StorageBackend::S3 => Err(StorageError::Backend(
            "built without the object-storage feature".into(),
        )),
    }
}
