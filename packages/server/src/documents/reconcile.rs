use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use docstore_common::storage::BlobStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};

use super::error::DocumentError;
use super::metadata::MetadataStore;

/// Outcome of one reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Blobs found in the store.
    pub scanned: usize,
    /// Blobs owned by a live record.
    pub referenced: usize,
    /// Orphans deleted.
    pub removed: usize,
    /// Orphans younger than the grace period, left alone.
    pub skipped_recent: usize,
    /// Orphans whose deletion failed.
    pub failed: usize,
    /// Stale partial writes purged from the store's staging area.
    pub incomplete_removed: usize,
}

/// Deletes blobs no metadata record refers to.
///
/// Orphans appear when a compensating delete fails or the process dies
/// between a blob write and the metadata write that would publish it. Blobs
/// younger than `grace` are skipped so an in-flight create or replace is
/// never robbed of the blob it is about to publish.
pub struct Reconciler {
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    grace: Duration,
}

impl Reconciler {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        grace: Duration,
    ) -> Self {
        Self {
            blobs,
            metadata,
            grace,
        }
    }

    #[instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ReconcileReport, DocumentError> {
        // List blobs before reading references: a blob published in between
        // then shows up as referenced rather than orphaned.
        let blobs = self.blobs.list().await?;
        let referenced = self.metadata.referenced_keys().await?;

        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(grace)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let mut report = ReconcileReport {
            scanned: blobs.len(),
            ..Default::default()
        };

        for blob in blobs {
            if referenced.contains(&blob.key) {
                report.referenced += 1;
                continue;
            }
            if blob.last_modified > cutoff {
                report.skipped_recent += 1;
                continue;
            }
            match self.blobs.delete(&blob.key).await {
                Ok(_) => {
                    info!(key = %blob.key, size = blob.size, "Removed orphaned blob");
                    report.removed += 1;
                }
                Err(e) => {
                    warn!(key = %blob.key, "Failed to remove orphaned blob: {e}");
                    report.failed += 1;
                }
            }
        }

        match self.blobs.purge_incomplete(cutoff).await {
            Ok(n) => report.incomplete_removed = n,
            Err(e) => warn!("Failed to purge incomplete writes: {e}"),
        }

        info!(
            scanned = report.scanned,
            removed = report.removed,
            skipped_recent = report.skipped_recent,
            failed = report.failed,
            incomplete_removed = report.incomplete_removed,
            "Reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Run `sweep` every `interval` until the task is aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    error!("Reconciliation sweep failed: {e}");
                }
            }
        })
    }
}
