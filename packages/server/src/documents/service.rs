use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use docstore_common::storage::{BlobStore, BoxReader, ContentHash, StorageKey};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error::DocumentError;
use super::metadata::MetadataStore;
use super::model::{
    Document, DocumentChanges, DocumentPatch, DocumentUpload, StoredFile, validate_title,
};

/// Keeps document metadata and blobs consistent across their lifecycle.
///
/// Ordering rules:
/// - a blob is written before any record points at it;
/// - a replacement goes to a fresh key and the old blob is only removed after
///   the record has been switched over;
/// - a delete removes the record before the blob.
///
/// A crash or failed cleanup can therefore leave an unreferenced blob, never
/// a record pointing at a missing one. Those orphans are collected by the
/// [`Reconciler`](super::reconcile::Reconciler).
pub struct DocumentService {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
}

/// Current time at the precision the metadata store keeps, so a returned
/// record compares equal to the same record read back later.
fn timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

impl DocumentService {
    pub fn new(blobs: Arc<dyn BlobStore>, metadata: Arc<dyn MetadataStore>) -> Self {
        Self { blobs, metadata }
    }

    #[instrument(skip(self, upload), fields(size = upload.content.len()))]
    pub async fn create(&self, upload: DocumentUpload) -> Result<Document, DocumentError> {
        let title = upload.validate()?;

        let id = Uuid::now_v7();
        let file = self.write_blob(id, &upload).await?;

        let now = timestamp();
        let document = Document {
            id,
            title,
            uploaded_at: now,
            updated_at: now,
            file,
        };

        if let Err(e) = self.metadata.insert(&document).await {
            warn!(%id, "Metadata insert failed: {e}");
            self.discard_blob(&document.file.storage_key).await;
            return Err(e.into());
        }

        info!(%id, key = %document.file.storage_key, "Document created");
        Ok(document)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<Document, DocumentError> {
        self.metadata
            .get(id)
            .await?
            .ok_or(DocumentError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Document>, DocumentError> {
        Ok(self.metadata.list().await?)
    }

    /// Replace both title and content. `uploaded_at` is kept.
    #[instrument(skip(self, upload), fields(size = upload.content.len()))]
    pub async fn replace(&self, id: Uuid, upload: DocumentUpload) -> Result<Document, DocumentError> {
        self.get(id).await?;
        let title = upload.validate()?;

        let file = self.write_blob(id, &upload).await?;
        let new_key = file.storage_key;

        let changes = DocumentChanges {
            title: Some(title),
            file: Some(file),
            updated_at: timestamp(),
        };

        let updated = match self.metadata.update(id, &changes).await {
            Ok(Some(updated)) => updated,
            Ok(None) => {
                // Deleted between the existence check and the swap.
                self.discard_blob(&new_key).await;
                return Err(DocumentError::NotFound(id));
            }
            Err(e) => {
                warn!(%id, "Metadata update failed: {e}");
                self.discard_blob(&new_key).await;
                return Err(DocumentError::Storage(e.to_string()));
            }
        };

        let previous_key = updated.previous.file.storage_key;
        if previous_key != new_key {
            self.discard_blob(&previous_key).await;
        }

        info!(%id, old_key = %previous_key, new_key = %new_key, "Document replaced");
        Ok(updated.current)
    }

    /// Change metadata only. The blob is never touched.
    #[instrument(skip(self, patch))]
    pub async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document, DocumentError> {
        let current = self.get(id).await?;
        if patch.is_empty() {
            debug!(%id, "Empty patch, returning document unchanged");
            return Ok(current);
        }

        let changes = DocumentChanges {
            title: patch.title.as_deref().map(validate_title).transpose()?,
            file: None,
            updated_at: timestamp(),
        };

        self.metadata
            .update(id, &changes)
            .await?
            .map(|updated| updated.current)
            .ok_or(DocumentError::NotFound(id))
    }

    /// Remove the record, then its blob. A failed blob delete is logged and
    /// left for reconciliation; the document is gone either way.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), DocumentError> {
        let removed = self
            .metadata
            .delete(id)
            .await?
            .ok_or(DocumentError::NotFound(id))?;

        self.discard_blob(&removed.file.storage_key).await;

        info!(%id, "Document deleted");
        Ok(())
    }

    /// Resolve a document's file reference to its content.
    #[instrument(skip(self))]
    pub async fn open(&self, id: Uuid) -> Result<(Document, BoxReader), DocumentError> {
        let mut document = self.get(id).await?;

        // A concurrent replace may delete the blob between reading the record
        // and opening it. Re-read once and follow the new key.
        for attempt in 0..2 {
            match self.blobs.get_stream(&document.file.storage_key).await {
                Ok(reader) => return Ok((document, reader)),
                Err(e) if e.is_not_found() && attempt == 0 => {
                    let stale_key = document.file.storage_key;
                    document = self.get(id).await?;
                    if document.file.storage_key == stale_key {
                        break;
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        error!(%id, key = %document.file.storage_key, "Record references a missing blob");
        Err(DocumentError::Storage(format!(
            "content for document {id} is missing"
        )))
    }

    async fn write_blob(
        &self,
        id: Uuid,
        upload: &DocumentUpload,
    ) -> Result<StoredFile, DocumentError> {
        let storage_key = StorageKey::generate(id);

        if let Err(e) = self.blobs.put(&storage_key, &upload.content).await {
            warn!(%id, key = %storage_key, "Blob write failed: {e}");
            // A failed write may still have left something behind remotely.
            self.discard_blob(&storage_key).await;
            return Err(e.into());
        }

        Ok(StoredFile {
            storage_key,
            filename: upload.filename(),
            content_type: upload.content_type(),
            size: upload.content.len() as u64,
            content_hash: ContentHash::compute(&upload.content),
        })
    }

    /// Best-effort blob removal. Failures are logged for the reconciler.
    async fn discard_blob(&self, key: &StorageKey) {
        match self.blobs.delete(key).await {
            Ok(_) => debug!(%key, "Discarded blob"),
            Err(e) => warn!(%key, "Failed to discard blob, leaving it for reconciliation: {e}"),
        }
    }
}
