use std::sync::Arc;
use std::time::Duration;

use docstore_common::storage::BlobStore;

use crate::config::AppConfig;
use crate::documents::{DocumentService, MetadataStore, Reconciler};

#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<DocumentService>,
    pub reconciler: Arc<Reconciler>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        let grace = Duration::from_secs(config.reconcile.grace_secs);
        Self {
            documents: Arc::new(DocumentService::new(blobs.clone(), metadata.clone())),
            reconciler: Arc::new(Reconciler::new(blobs, metadata, grace)),
            config,
        }
    }
}
