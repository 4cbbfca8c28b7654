use chrono::{DateTime, Utc};
use docstore_common::storage::{ContentHash, StorageKey};
use uuid::Uuid;

use super::error::DocumentError;

/// Longest accepted title, in Unicode scalar values.
pub const MAX_TITLE_CHARS: usize = 256;

/// Filename recorded when the upload did not carry a usable one.
pub const DEFAULT_FILENAME: &str = "document";

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A document's metadata record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    /// Set once at creation; a replace keeps it.
    pub uploaded_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub file: StoredFile,
}

/// The blob a document owns, plus the attributes that change with it.
///
/// Always replaced as a whole so `storage_key` never drifts from the content
/// it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub storage_key: StorageKey,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub content_hash: ContentHash,
}

/// Title plus file content, as required by create and replace.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub title: String,
    pub content: Vec<u8>,
    /// Client-supplied filename, already reduced to a flat name.
    pub filename: Option<String>,
    /// Content type declared on the upload part.
    pub content_type: Option<String>,
}

impl DocumentUpload {
    pub fn new(title: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            filename: None,
            content_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Check the upload and return the normalized title.
    pub fn validate(&self) -> Result<String, DocumentError> {
        let title = validate_title(&self.title)?;
        if self.content.is_empty() {
            return Err(DocumentError::Validation("File must not be empty".into()));
        }
        Ok(title)
    }

    pub(crate) fn filename(&self) -> String {
        self.filename
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string()
    }

    /// Guess from the filename first; browsers often send a generic part type.
    pub(crate) fn content_type(&self) -> String {
        self.filename
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.to_string())
            .or_else(|| self.content_type.clone())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string())
    }
}

/// Partial update. Only the title may change without a new file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub title: Option<String>,
}

impl DocumentPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
    }
}

/// Field changes handed to the metadata store in a single atomic write.
#[derive(Debug, Clone)]
pub struct DocumentChanges {
    pub title: Option<String>,
    pub file: Option<StoredFile>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentChanges {
    pub fn apply(&self, document: &mut Document) {
        if let Some(title) = &self.title {
            document.title = title.clone();
        }
        if let Some(file) = &self.file {
            document.file = file.clone();
        }
        document.updated_at = self.updated_at;
    }
}

/// Result of an atomic metadata update: the record before and after.
#[derive(Debug, Clone)]
pub struct UpdatedDocument {
    pub previous: Document,
    pub current: Document,
}

/// Trim and check a title (1-256 characters).
pub fn validate_title(title: &str) -> Result<String, DocumentError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_CHARS {
        return Err(DocumentError::Validation(format!(
            "Title must be 1-{MAX_TITLE_CHARS} characters"
        )));
    }
    Ok(title.to_string())
}
