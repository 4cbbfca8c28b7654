use docstore_common::storage::{BlobStore, StorageKey};
use uuid::Uuid;

use crate::common::{TestApp, routes};

#[tokio::test]
async fn reconcile_removes_orphans_and_keeps_live_blobs() {
    let app = TestApp::spawn().await;
    let id = app.create_document("Live", "live.txt", b"live").await;
    let orphan = StorageKey::generate(Uuid::now_v7());
    app.blobs.put(&orphan, b"stray").await.unwrap();

    let res = app.post(routes::RECONCILE).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["scanned"], 2);
    assert_eq!(res.body["referenced"], 1);
    assert_eq!(res.body["removed"], 1);
    assert_eq!(res.body["failed"], 0);
    assert!(!app.blobs.exists(&orphan).await.unwrap());

    let (status, _, bytes) = app.download(id).await;
    assert_eq!(status, 200);
    assert_eq!(bytes, b"live");
}

#[tokio::test]
async fn reconcile_purges_abandoned_uploads() {
    let app = TestApp::spawn().await;
    let stray = app.blob_dir.path().join(".tmp").join("interrupted");
    std::fs::write(&stray, b"partial").unwrap();

    let res = app.post(routes::RECONCILE).await;

    assert_eq!(res.status, 200, "{}", res.text);
    assert_eq!(res.body["incomplete_removed"], 1);
    assert!(!stray.exists());
}

#[tokio::test]
async fn reconcile_on_empty_store_reports_nothing() {
    let app = TestApp::spawn().await;

    let res = app.post(routes::RECONCILE).await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["scanned"], 0);
    assert_eq!(res.body["removed"], 0);
}
