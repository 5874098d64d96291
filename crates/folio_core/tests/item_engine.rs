mod common;

use common::{provisioned_store, shared, RecordingStore, TEST_TIMEOUT};
use folio_core::model::item::FieldMap;
use folio_core::model::records::{Asset, Download};
use folio_core::repo::item_repo::{ItemRepository, RepoError};
use folio_core::store::{KvStore, SqliteKvStore, StoreError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn asset(name: &str, url: &str) -> Asset {
    Asset {
        name: name.to_string(),
        url: url.to_string(),
        content_type: "application/pdf".to_string(),
        size: 1024,
        active: true,
        description: None,
    }
}

fn download(index: usize) -> Download {
    Download {
        asset_name: format!("asset-{index}"),
        referrer: None,
        user_agent: None,
    }
}

async fn asset_repo() -> ItemRepository<Asset> {
    let (store, names) = provisioned_store().await;
    ItemRepository::new(Arc::new(store), names.assets, TEST_TIMEOUT)
}

async fn download_repo(store: Arc<dyn KvStore>) -> ItemRepository<Download> {
    ItemRepository::new(store, "folio-downloads", TEST_TIMEOUT)
}

#[tokio::test]
async fn insert_then_fetch_returns_same_item() {
    let repo = asset_repo().await;

    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();
    assert_eq!(created.created_at, created.updated_at);

    let loaded = repo.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(loaded, created);
}

#[tokio::test]
async fn fetch_unknown_id_is_none() {
    let repo = asset_repo().await;
    assert!(repo.fetch(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn update_touches_only_named_fields_and_bumps_timestamp() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    let mut fields = FieldMap::new();
    fields.insert("url".to_string(), json!("/files/cv-2026.pdf"));
    fields.insert("size".to_string(), json!(2048));
    let updated = repo.update(created.id, &fields).await.unwrap().unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.fields.url, "/files/cv-2026.pdf");
    assert_eq!(updated.fields.size, 2048);
    assert_eq!(updated.fields.name, created.fields.name);
    assert_eq!(updated.fields.content_type, created.fields.content_type);
    assert!(updated.fields.active);

    let reloaded = repo.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(reloaded, updated);
}

#[tokio::test]
async fn update_accepts_reserved_word_field_names() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), json!("portfolio"));
    fields.insert("size".to_string(), json!(7));
    let updated = repo.update(created.id, &fields).await.unwrap().unwrap();

    assert_eq!(updated.fields.name, "portfolio");
    assert_eq!(updated.fields.size, 7);
}

#[tokio::test]
async fn update_ignores_envelope_fields_in_changes() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    let mut fields = FieldMap::new();
    fields.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
    fields.insert("created_at".to_string(), json!(1));
    fields.insert("active".to_string(), Value::Bool(false));
    let updated = repo.update(created.id, &fields).await.unwrap().unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(!updated.fields.active);
}

#[tokio::test]
async fn empty_update_only_bumps_timestamp() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    let updated = repo
        .update(created.id, &FieldMap::new())
        .await
        .unwrap()
        .unwrap();

    assert!(updated.updated_at > created.updated_at);
    assert_eq!(updated.fields, created.fields);
}

#[tokio::test]
async fn update_unknown_id_is_none_and_creates_nothing() {
    let repo = asset_repo().await;
    let missing = Uuid::new_v4();

    let mut fields = FieldMap::new();
    fields.insert("url".to_string(), json!("/x"));
    assert!(repo.update(missing, &fields).await.unwrap().is_none());
    assert!(repo.fetch(missing).await.unwrap().is_none());
}

#[tokio::test]
async fn mistyped_update_is_rejected_before_writing() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    let mut fields = FieldMap::new();
    fields.insert("size".to_string(), json!("big"));
    fields.insert("url".to_string(), json!("/files/other.pdf"));
    let err = repo.update(created.id, &fields).await.unwrap_err();
    assert!(matches!(err, RepoError::Codec(_)));

    let stored = repo.fetch(created.id).await.unwrap().unwrap();
    assert_eq!(stored, created);
    assert_eq!(repo.scan_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn remove_is_idempotent() {
    let repo = asset_repo().await;
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();

    assert!(repo.remove(created.id).await.unwrap());
    assert!(repo.fetch(created.id).await.unwrap().is_none());
    assert!(repo.remove(created.id).await.unwrap());
    assert!(repo.remove(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn scan_all_returns_every_item() {
    let repo = asset_repo().await;
    for index in 0..3 {
        repo.insert(asset(&format!("asset-{index}"), "/x"))
            .await
            .unwrap();
    }
    assert_eq!(repo.scan_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn unknown_collection_is_reported_not_empty() {
    let (store, _) = provisioned_store().await;
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(store), "folio-missing", TEST_TIMEOUT);

    let err = repo.scan_all().await.unwrap_err();
    assert!(matches!(
        err,
        RepoError::Store {
            source: StoreError::CollectionNotFound(_),
            ..
        }
    ));
}

#[tokio::test]
async fn batch_insert_of_26_uses_two_store_calls() {
    let (store, _) = provisioned_store().await;
    let (recorder, kv) = shared(RecordingStore::new(store));
    let repo = download_repo(kv).await;

    let items = repo
        .batch_insert((0..26).map(download).collect())
        .await
        .unwrap();

    assert_eq!(recorder.batch_sizes(), vec![25, 1]);
    assert_eq!(items.len(), 26);
    let mut ids: Vec<_> = items.iter().map(|item| item.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 26);
    assert!(items
        .iter()
        .all(|item| item.created_at == items[0].created_at && item.updated_at == item.created_at));
    assert_eq!(repo.scan_all().await.unwrap().len(), 26);
}

#[tokio::test]
async fn batch_chunks_are_written_concurrently() {
    let (store, _) = provisioned_store().await;
    let (recorder, kv) =
        shared(RecordingStore::new(store).delaying_batches(Duration::from_millis(300)));
    let repo = download_repo(kv).await;

    let started_at = Instant::now();
    repo.batch_insert((0..30).map(download).collect())
        .await
        .unwrap();
    let elapsed = started_at.elapsed();

    assert_eq!(recorder.batch_sizes(), vec![25, 5]);
    assert!(
        elapsed < Duration::from_millis(550),
        "chunks ran one after another: {elapsed:?}"
    );
}

#[tokio::test]
async fn batch_insert_of_nothing_makes_no_store_call() {
    let (store, _) = provisioned_store().await;
    let (recorder, kv) = shared(RecordingStore::new(store));
    let repo = download_repo(kv).await;

    let items = repo.batch_insert(Vec::new()).await.unwrap();

    assert!(items.is_empty());
    assert!(recorder.batch_sizes().is_empty());
}

#[tokio::test]
async fn batch_insert_reports_failed_chunk_and_keeps_committed_ones() {
    let (store, _) = provisioned_store().await;
    let (_recorder, kv) = shared(RecordingStore::new(store).failing_on(&[1]));
    let repo = download_repo(kv).await;

    let outcome = repo
        .batch_insert_detailed((0..60).map(download).collect())
        .await
        .unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.items().len(), 60);
    assert_eq!(outcome.chunks().len(), 3);
    let failed: Vec<_> = outcome
        .chunks()
        .iter()
        .filter(|chunk| !chunk.is_committed())
        .collect();
    assert_eq!(failed.len(), 1);
    assert!(!failed[0].is_ambiguous());
    let failed_count = failed[0].item_ids.len();

    let stored = repo.scan_all().await.unwrap();
    assert_eq!(stored.len(), 60 - failed_count);

    match outcome.into_result().unwrap_err() {
        RepoError::BatchIncomplete(failure) => {
            assert_eq!(failure.total_chunks, 3);
            assert_eq!(failure.failed.len(), 1);
            assert_eq!(failure.failed_ids().len(), failed_count);
            assert_eq!(failure.committed.len(), 60 - failed_count);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_chunk_payloads_can_be_resubmitted() {
    let (store, _) = provisioned_store().await;
    let (_recorder, kv) = shared(RecordingStore::new(store.clone()).failing_on(&[0]));
    let failing_repo = download_repo(kv).await;

    let outcome = failing_repo
        .batch_insert_detailed((0..10).map(download).collect())
        .await
        .unwrap();
    let retry = outcome.into_failed_payloads();
    assert_eq!(retry.len(), 10);

    let healthy_repo = download_repo(Arc::new(store)).await;
    healthy_repo.batch_insert(retry).await.unwrap();
    assert_eq!(healthy_repo.scan_all().await.unwrap().len(), 10);
}

#[tokio::test]
async fn slow_batch_chunk_times_out_as_ambiguous() {
    let (store, _) = provisioned_store().await;
    let (_recorder, kv) =
        shared(RecordingStore::new(store).delaying_batches(Duration::from_millis(500)));
    let repo: ItemRepository<Download> =
        ItemRepository::new(kv, "folio-downloads", Duration::from_millis(20));

    let outcome = repo
        .batch_insert_detailed((0..3).map(download).collect())
        .await
        .unwrap();

    assert_eq!(outcome.chunks().len(), 1);
    assert!(outcome.chunks()[0].is_ambiguous());
    assert!(matches!(
        outcome.chunks()[0].error,
        Some(RepoError::Timeout { .. })
    ));
}

#[tokio::test]
async fn store_rejects_oversized_batch() {
    let (store, names) = provisioned_store().await;
    let documents = (0..26)
        .map(|index| {
            let mut document = serde_json::Map::new();
            document.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
            document.insert("created_at".to_string(), json!(index));
            document.insert("updated_at".to_string(), json!(index));
            document
        })
        .collect();

    let err = store
        .batch_write(&names.downloads, documents)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::BatchTooLarge { len: 26, max: 25 }));
}

#[tokio::test]
async fn items_survive_reopening_a_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let location = folio_core::db::DbLocation::File(dir.path().join("folio.db"));

    let store = SqliteKvStore::open(&location).unwrap();
    store.create_collection("folio-assets").await.unwrap();
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(store), "folio-assets", TEST_TIMEOUT);
    let created = repo.insert(asset("resume", "/files/cv.pdf")).await.unwrap();
    drop(repo);

    let reopened = SqliteKvStore::open(&location).unwrap();
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(reopened), "folio-assets", TEST_TIMEOUT);
    assert_eq!(repo.fetch(created.id).await.unwrap().unwrap(), created);
}
