use std::collections::HashSet;

use async_trait::async_trait;
use docstore_common::storage::{ContentHash, StorageKey};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, QuerySelect, Set, SqlErr,
    TransactionTrait,
};
use uuid::Uuid;

use super::error::MetadataError;
use super::model::{Document, DocumentChanges, StoredFile, UpdatedDocument};
use crate::entity::document;

/// Durable storage for document metadata records.
///
/// `update` and `delete` must be atomic with respect to each other for the
/// same id. Both return the record as it was before the change so the caller
/// learns which blob it displaced from the same atomic step.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new record. Fails with `Duplicate` if the id or storage key exists.
    async fn insert(&self, document: &Document) -> Result<(), MetadataError>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>, MetadataError>;

    /// Apply `changes` atomically. `None` if no record has this id.
    async fn update(
        &self,
        id: Uuid,
        changes: &DocumentChanges,
    ) -> Result<Option<UpdatedDocument>, MetadataError>;

    /// Remove a record, returning it. `None` if no record has this id.
    async fn delete(&self, id: Uuid) -> Result<Option<Document>, MetadataError>;

    /// All records, oldest upload first, ties broken by id.
    async fn list(&self) -> Result<Vec<Document>, MetadataError>;

    /// Every storage key currently referenced by a record.
    async fn referenced_keys(&self) -> Result<HashSet<StorageKey>, MetadataError>;
}

/// PostgreSQL-backed metadata store on the `document` table.
pub struct SeaOrmMetadataStore {
    db: DatabaseConnection,
}

impl SeaOrmMetadataStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl TryFrom<document::Model> for Document {
    type Error = MetadataError;

    fn try_from(model: document::Model) -> Result<Self, Self::Error> {
        let corrupt = |reason: String| MetadataError::Corrupt {
            id: model.id,
            reason,
        };
        let storage_key = StorageKey::parse(&model.storage_key)
            .map_err(|e| corrupt(e.to_string()))?;
        let content_hash = ContentHash::from_hex(&model.content_hash)
            .ok_or_else(|| corrupt(format!("bad content hash {:?}", model.content_hash)))?;
        let size = u64::try_from(model.size)
            .map_err(|_| corrupt(format!("negative size {}", model.size)))?;

        Ok(Document {
            id: model.id,
            title: model.title,
            uploaded_at: model.uploaded_at,
            updated_at: model.updated_at,
            file: StoredFile {
                storage_key,
                filename: model.filename,
                content_type: model.content_type,
                size,
                content_hash,
            },
        })
    }
}

fn size_column(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn to_active_model(doc: &Document) -> document::ActiveModel {
    document::ActiveModel {
        id: Set(doc.id),
        title: Set(doc.title.clone()),
        storage_key: Set(doc.file.storage_key.to_string()),
        filename: Set(doc.file.filename.clone()),
        content_type: Set(doc.file.content_type.clone()),
        size: Set(size_column(doc.file.size)),
        content_hash: Set(doc.file.content_hash.to_hex()),
        uploaded_at: Set(doc.uploaded_at),
        updated_at: Set(doc.updated_at),
    }
}

#[async_trait]
impl MetadataStore for SeaOrmMetadataStore {
    async fn insert(&self, doc: &Document) -> Result<(), MetadataError> {
        match document::Entity::insert(to_active_model(doc))
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                Err(MetadataError::Duplicate(doc.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, MetadataError> {
        document::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Document::try_from)
            .transpose()
    }

    async fn update(
        &self,
        id: Uuid,
        changes: &DocumentChanges,
    ) -> Result<Option<UpdatedDocument>, MetadataError> {
        let txn = self.db.begin().await?;

        let Some(existing) = document::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        let previous = Document::try_from(existing.clone())?;
        let mut current = previous.clone();
        changes.apply(&mut current);

        let mut active: document::ActiveModel = existing.into();
        active.title = Set(current.title.clone());
        if changes.file.is_some() {
            active.storage_key = Set(current.file.storage_key.to_string());
            active.filename = Set(current.file.filename.clone());
            active.content_type = Set(current.file.content_type.clone());
            active.size = Set(size_column(current.file.size));
            active.content_hash = Set(current.file.content_hash.to_hex());
        }
        active.updated_at = Set(current.updated_at);
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(UpdatedDocument { previous, current }))
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Document>, MetadataError> {
        let txn = self.db.begin().await?;

        let Some(existing) = document::Entity::find_by_id(id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
        else {
            return Ok(None);
        };

        document::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        Document::try_from(existing).map(Some)
    }

    async fn list(&self) -> Result<Vec<Document>, MetadataError> {
        document::Entity::find()
            .order_by_asc(document::Column::UploadedAt)
            .order_by_asc(document::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(Document::try_from)
            .collect()
    }

    async fn referenced_keys(&self) -> Result<HashSet<StorageKey>, MetadataError> {
        let rows: Vec<(Uuid, String)> = document::Entity::find()
            .select_only()
            .column(document::Column::Id)
            .column(document::Column::StorageKey)
            .into_tuple()
            .all(&self.db)
            .await?;

        rows.into_iter()
            .map(|(id, key)| {
                StorageKey::parse(&key).map_err(|e| MetadataError::Corrupt {
                    id,
                    reason: e.to_string(),
                })
            })
            .collect()
    }
}
