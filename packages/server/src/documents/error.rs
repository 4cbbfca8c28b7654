use docstore_common::storage::StorageError;
use sea_orm::DbErr;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a [`MetadataStore`](super::metadata::MetadataStore).
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("corrupt record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// Errors returned by the document lifecycle operations.
///
/// Backend error types stop here; callers only ever see these four kinds.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Bad input the client can fix.
    #[error("{0}")]
    Validation(String),

    #[error("document {0} not found")]
    NotFound(Uuid),

    /// Identifier or storage key collision.
    #[error("{0}")]
    Conflict(String),

    /// Blob or metadata backend failure. Retryable.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<StorageError> for DocumentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::SizeLimitExceeded { limit, .. } => {
                DocumentError::Validation(format!("File exceeds maximum size of {limit} bytes"))
            }
            other => DocumentError::Storage(other.to_string()),
        }
    }
}

impl From<MetadataError> for DocumentError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::Duplicate(what) => {
                DocumentError::Conflict(format!("Document already exists: {what}"))
            }
            other => DocumentError::Storage(other.to_string()),
        }
    }
}
