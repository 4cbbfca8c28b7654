//! Document lifecycle: metadata records, their blobs, and the rules that keep
//! the two in step.

mod error;
mod memory;
mod metadata;
mod model;
mod reconcile;
mod service;

pub use error::{DocumentError, MetadataError};
pub use memory::InMemoryMetadataStore;
pub use metadata::{MetadataStore, SeaOrmMetadataStore};
pub use model::{
    DEFAULT_FILENAME, Document, DocumentChanges, DocumentPatch, DocumentUpload, MAX_TITLE_CHARS,
    StoredFile, UpdatedDocument, validate_title,
};
pub use reconcile::{ReconcileReport, Reconciler};
pub use service::DocumentService;
