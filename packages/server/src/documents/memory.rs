use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use docstore_common::storage::StorageKey;
use uuid::Uuid;

use super::error::MetadataError;
use super::metadata::MetadataStore;
use super::model::{Document, DocumentChanges, UpdatedDocument};

/// In-memory metadata store for tests and embedding.
///
/// Per-id atomicity comes from the map's entry locks: an update holds the
/// entry for the whole read-modify-write, and a concurrent delete waits on it.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    records: DashMap<Uuid, Document>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn insert(&self, document: &Document) -> Result<(), MetadataError> {
        match self.records.entry(document.id) {
            Entry::Occupied(_) => Err(MetadataError::Duplicate(document.id.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(document.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, MetadataError> {
        Ok(self.records.get(&id).map(|doc| doc.clone()))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &DocumentChanges,
    ) -> Result<Option<UpdatedDocument>, MetadataError> {
        let Some(mut doc) = self.records.get_mut(&id) else {
            return Ok(None);
        };
        let previous = doc.clone();
        changes.apply(&mut doc);
        Ok(Some(UpdatedDocument {
            previous,
            current: doc.clone(),
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Document>, MetadataError> {
        Ok(self.records.remove(&id).map(|(_, doc)| doc))
    }

    async fn list(&self) -> Result<Vec<Document>, MetadataError> {
        let mut docs: Vec<Document> = self.records.iter().map(|e| e.value().clone()).collect();
        docs.sort_by(|a, b| (a.uploaded_at, a.id).cmp(&(b.uploaded_at, b.id)));
        Ok(docs)
    }

    async fn referenced_keys(&self) -> Result<HashSet<StorageKey>, MetadataError> {
        Ok(self
            .records
            .iter()
            .map(|e| e.value().file.storage_key)
            .collect())
    }
}
