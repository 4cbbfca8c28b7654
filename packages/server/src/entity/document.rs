use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Metadata row for a stored document. The content itself lives in the blob
/// store under `storage_key`.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document")]
pub struct Model {
    /// UUIDv7 primary key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub title: String,

    /// Blob this record owns. Unique: a blob never backs two documents.
    #[sea_orm(unique)]
    pub storage_key: String,

    /// Original upload filename.
    pub filename: String,

    pub content_type: String,

    pub size: i64,

    /// SHA-256 of the blob, hex encoded.
    pub content_hash: String,

    #[sea_orm(indexed)]
    pub uploaded_at: DateTimeUtc,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}
