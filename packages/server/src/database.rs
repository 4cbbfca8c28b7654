use std::time::Duration;

use sea_orm::sea_query::{Index, PostgresQueryBuilder};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::{info, warn};

use crate::entity::document;

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    // Set connection pool options
    opt.max_connections(50)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let db = Database::connect(opt).await?;
    db.get_schema_registry("docstore_server::entity::*")
        .sync(&db)
        .await?;

    Ok(db)
}

/// Create indexes the schema sync does not derive from the entities.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    // Listing order: ORDER BY uploaded_at, id
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_document_uploaded_id")
        .table(document::Entity)
        .col(document::Column::UploadedAt)
        .col(document::Column::Id)
        .to_string(PostgresQueryBuilder);

    match db.execute_unprepared(&stmt).await {
        Ok(_) => info!("Ensured index idx_document_uploaded_id exists"),
        Err(e) => warn!("Failed to create index idx_document_uploaded_id: {}", e),
    }

    Ok(())
}
