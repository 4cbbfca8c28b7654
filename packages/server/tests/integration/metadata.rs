use chrono::{Duration, SubsecRound, Utc};
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use uuid::Uuid;

use docstore_common::storage::{ContentHash, StorageKey};
use docstore_server::documents::{
    Document, DocumentChanges, MetadataError, MetadataStore, SeaOrmMetadataStore, StoredFile,
};

use crate::common::fresh_database;

fn document(title: &str, offset_secs: i64) -> Document {
    let id = Uuid::now_v7();
    let at = (Utc::now() + Duration::seconds(offset_secs)).trunc_subsecs(6);
    Document {
        id,
        title: title.to_string(),
        uploaded_at: at,
        updated_at: at,
        file: StoredFile {
            storage_key: StorageKey::generate(id),
            filename: format!("{title}.txt"),
            content_type: "text/plain".into(),
            size: title.len() as u64,
            content_hash: ContentHash::compute(title.as_bytes()),
        },
    }
}

async fn store() -> SeaOrmMetadataStore {
    let (db, _) = fresh_database().await;
    SeaOrmMetadataStore::new(db)
}

#[tokio::test]
async fn insert_then_get_returns_same_record() {
    let store = store().await;
    let doc = document("alpha", 0);

    store.insert(&doc).await.unwrap();

    assert_eq!(store.get(doc.id).await.unwrap(), Some(doc));
    assert_eq!(store.get(Uuid::now_v7()).await.unwrap(), None);
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
    let store = store().await;
    let doc = document("alpha", 0);
    store.insert(&doc).await.unwrap();

    let mut again = document("beta", 0);
    again.id = doc.id;

    assert!(matches!(
        store.insert(&again).await,
        Err(MetadataError::Duplicate(_))
    ));
}

#[tokio::test]
async fn duplicate_storage_key_is_rejected() {
    let store = store().await;
    let doc = document("alpha", 0);
    store.insert(&doc).await.unwrap();

    let mut clash = document("beta", 0);
    clash.file.storage_key = doc.file.storage_key;

    assert!(matches!(
        store.insert(&clash).await,
        Err(MetadataError::Duplicate(_))
    ));
}

#[tokio::test]
async fn update_returns_previous_and_current() {
    let store = store().await;
    let doc = document("alpha", 0);
    store.insert(&doc).await.unwrap();

    let new_file = document("beta", 0).file;
    let changes = DocumentChanges {
        title: Some("renamed".into()),
        file: Some(new_file.clone()),
        updated_at: doc.updated_at + Duration::seconds(5),
    };
    let updated = store.update(doc.id, &changes).await.unwrap().unwrap();

    assert_eq!(updated.previous, doc);
    assert_eq!(updated.current.title, "renamed");
    assert_eq!(updated.current.file, new_file);
    assert_eq!(updated.current.uploaded_at, doc.uploaded_at);
    assert_eq!(store.get(doc.id).await.unwrap(), Some(updated.current));
}

#[tokio::test]
async fn update_and_delete_missing_return_none() {
    let store = store().await;
    let changes = DocumentChanges {
        title: Some("x".into()),
        file: None,
        updated_at: Utc::now(),
    };

    assert!(store.update(Uuid::now_v7(), &changes).await.unwrap().is_none());
    assert!(store.delete(Uuid::now_v7()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_returns_removed_record() {
    let store = store().await;
    let doc = document("alpha", 0);
    store.insert(&doc).await.unwrap();

    assert_eq!(store.delete(doc.id).await.unwrap(), Some(doc.clone()));
    assert_eq!(store.get(doc.id).await.unwrap(), None);
    assert!(store.referenced_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn list_orders_by_upload_time() {
    let store = store().await;
    let late = document("late", 10);
    let early = document("early", -10);
    let middle = document("middle", 0);
    for doc in [&late, &early, &middle] {
        store.insert(doc).await.unwrap();
    }

    let titles: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.title)
        .collect();

    assert_eq!(titles, ["early", "middle", "late"]);
}

#[tokio::test]
async fn referenced_keys_covers_every_record() {
    let store = store().await;
    let a = document("a", 0);
    let b = document("b", 0);
    store.insert(&a).await.unwrap();
    store.insert(&b).await.unwrap();

    let keys = store.referenced_keys().await.unwrap();

    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&a.file.storage_key));
    assert!(keys.contains(&b.file.storage_key));
}

#[tokio::test]
async fn corrupt_row_surfaces_as_error() {
    let (db, _) = fresh_database().await;
    let store = SeaOrmMetadataStore::new(db.clone());
    let doc = document("alpha", 0);
    store.insert(&doc).await.unwrap();

    db.execute_raw(Statement::from_string(
        DbBackend::Postgres,
        format!(
            "UPDATE document SET storage_key = '../../etc/passwd' WHERE id = '{}'",
            doc.id
        ),
    ))
    .await
    .unwrap();

    assert!(matches!(
        store.get(doc.id).await,
        Err(MetadataError::Corrupt { .. })
    ));
}
