use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::{Document, DocumentPatch, ReconcileReport};

/// Public representation of a document.
#[derive(Serialize, utoipa::ToSchema)]
pub struct DocumentResponse {
    /// Document ID (UUIDv7).
    #[schema(example = "01936f0e-1234-7abc-8000-000000000001")]
    pub id: Uuid,
    #[schema(example = "Quarterly report")]
    pub title: String,
    /// When the document was first uploaded. Unchanged by replacement.
    pub uploaded_at: DateTime<Utc>,
    /// Absolute URL serving the document's current content.
    #[schema(example = "http://localhost:3000/api/v1/documents/01936f0e-1234-7abc-8000-000000000001/file")]
    pub file: String,
}

impl DocumentResponse {
    pub fn new(doc: &Document, base_url: &str) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            uploaded_at: doc.uploaded_at,
            file: file_url(base_url, doc.id),
        }
    }
}

/// Link to the download endpoint for `id`.
pub fn file_url(base_url: &str, id: Uuid) -> String {
    format!("{}/api/v1/documents/{id}/file", base_url.trim_end_matches('/'))
}

/// Multipart body for create and replace. Both fields are required.
#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
pub struct DocumentUploadForm {
    #[schema(example = "Quarterly report")]
    pub title: String,
    /// File content. The part's filename is recorded for downloads.
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// JSON body for PATCH. Only the title can change without re-uploading.
#[derive(Deserialize, Default, utoipa::ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PatchDocumentRequest {
    #[schema(example = "Renamed report")]
    pub title: Option<String>,
}

impl From<PatchDocumentRequest> for DocumentPatch {
    fn from(req: PatchDocumentRequest) -> Self {
        DocumentPatch { title: req.title }
    }
}

/// Result of an orphaned-blob sweep.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ReconcileResponse {
    /// Blobs found in storage.
    pub scanned: usize,
    /// Blobs owned by a document.
    pub referenced: usize,
    /// Orphaned blobs deleted.
    pub removed: usize,
    /// Orphans too recent to delete safely.
    pub skipped_recent: usize,
    /// Orphans whose deletion failed.
    pub failed: usize,
    /// Abandoned partial uploads cleaned up.
    pub incomplete_removed: usize,
}

impl From<ReconcileReport> for ReconcileResponse {
    fn from(report: ReconcileReport) -> Self {
        Self {
            scanned: report.scanned,
            referenced: report.referenced,
            removed: report.removed,
            skipped_recent: report.skipped_recent,
            failed: report.failed,
            incomplete_removed: report.incomplete_removed,
        }
    }
}
