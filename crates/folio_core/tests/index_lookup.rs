mod common;

use common::{provisioned_store, TEST_TIMEOUT};
use folio_core::config::{NAME_FIELD, NAME_INDEX, SLUG_FIELD, SLUG_INDEX};
use folio_core::db::DbLocation;
use folio_core::model::codec::{stamp, to_document};
use folio_core::model::records::{Asset, LogoStory};
use folio_core::repo::item_repo::{ItemRepository, RepoError};
use folio_core::store::{
    provision_site_schema, KvStore, SqliteKvStore, StoreError, UpdateExpression,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

fn asset(name: &str, url: &str) -> Asset {
    Asset {
        name: name.to_string(),
        url: url.to_string(),
        content_type: "application/pdf".to_string(),
        size: 10,
        active: true,
        description: None,
    }
}

fn story(slug: &str, title: &str) -> LogoStory {
    LogoStory {
        slug: slug.to_string(),
        title: title.to_string(),
        brand: "Acme".to_string(),
        story: "How the mark came to be.".to_string(),
        logo_url: "/logos/acme.svg".to_string(),
        published: true,
    }
}

#[tokio::test]
async fn find_by_field_returns_newest_match() {
    let (store, names) = provisioned_store().await;
    let uploads = [
        (2_000, "/middle.pdf"),
        (3_000, "/newest.pdf"),
        (1_000, "/oldest.pdf"),
    ];
    for (created_at, url) in uploads {
        let document = to_document(&stamp(asset("resume", url), created_at)).unwrap();
        store.put_item(&names.assets, document).await.unwrap();
    }
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(store), names.assets, TEST_TIMEOUT);
    repo.insert(asset("press-kit", "/kit.zip")).await.unwrap();

    let found = repo
        .find_by_field(NAME_INDEX, NAME_FIELD, "resume")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.fields.url, "/newest.pdf");
    assert_eq!(found.created_at, 3_000);

    let all = repo
        .query_by_field(NAME_INDEX, NAME_FIELD, "resume")
        .await
        .unwrap();
    let urls: Vec<&str> = all.iter().map(|item| item.fields.url.as_str()).collect();
    assert_eq!(urls, vec!["/newest.pdf", "/middle.pdf", "/oldest.pdf"]);
}

#[tokio::test]
async fn equal_timestamps_break_ties_by_id() {
    let (store, names) = provisioned_store().await;
    let repo: ItemRepository<LogoStory> =
        ItemRepository::new(Arc::new(store), names.logo_stories, TEST_TIMEOUT);

    let items = repo
        .batch_insert(vec![
            story("acme", "First"),
            story("acme", "Second"),
            story("acme", "Third"),
        ])
        .await
        .unwrap();
    let lowest_id = items.iter().map(|item| item.id).min().unwrap();

    for _ in 0..3 {
        let found = repo
            .find_by_field(SLUG_INDEX, SLUG_FIELD, "acme")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, lowest_id);
    }
}

#[tokio::test]
async fn find_by_field_without_match_is_none() {
    let (store, names) = provisioned_store().await;
    let repo: ItemRepository<LogoStory> =
        ItemRepository::new(Arc::new(store), names.logo_stories, TEST_TIMEOUT);

    let found = repo
        .find_by_field(SLUG_INDEX, SLUG_FIELD, "nothing-here")
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn missing_index_is_an_error_not_an_empty_result() {
    let store = SqliteKvStore::open(&DbLocation::Memory).unwrap();
    store.create_collection("folio-assets").await.unwrap();
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(store), "folio-assets", TEST_TIMEOUT);
    repo.insert(asset("resume", "/cv.pdf")).await.unwrap();

    let err = repo
        .find_by_field(NAME_INDEX, NAME_FIELD, "resume")
        .await
        .unwrap_err();
    match err {
        RepoError::IndexNotProvisioned { collection, index } => {
            assert_eq!(collection, "folio-assets");
            assert_eq!(index, NAME_INDEX);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn index_keyed_by_other_field_is_rejected() {
    let (store, names) = provisioned_store().await;
    let repo: ItemRepository<Asset> = ItemRepository::new(Arc::new(store), names.assets, TEST_TIMEOUT);

    let err = repo
        .find_by_field(NAME_INDEX, "url", "/cv.pdf")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::Store {
            source: StoreError::IndexKeyMismatch { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn bare_reserved_word_in_expression_is_rejected() {
    let (store, names) = provisioned_store().await;
    let repo: ItemRepository<Asset> =
        ItemRepository::new(Arc::new(store.clone()), names.assets.clone(), TEST_TIMEOUT);
    let created = repo.insert(asset("resume", "/cv.pdf")).await.unwrap();

    let mut values = BTreeMap::new();
    values.insert(":v0".to_string(), json!(99));
    let bare = UpdateExpression::from_parts("SET size = :v0", BTreeMap::new(), values.clone());
    let err = store
        .update_item(
            &names.assets,
            &created.id.to_string(),
            &bare,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidExpression(_)));

    let mut aliases = BTreeMap::new();
    aliases.insert("#f0".to_string(), "size".to_string());
    let aliased = UpdateExpression::from_parts("SET #f0 = :v0", aliases, values);
    let document = store
        .update_item(
            &names.assets,
            &created.id.to_string(),
            &aliased,
        )
        .await
        .unwrap();
    assert_eq!(document.get("size"), Some(&json!(99)));
}

#[tokio::test]
async fn store_update_of_absent_key_creates_nothing() {
    let (store, names) = provisioned_store().await;
    let expression = UpdateExpression::builder("url", json!("/ghost.pdf")).build();

    let err = store
        .update_item(&names.assets, "missing-key", &expression)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::ConditionFailed { .. }));
    assert!(store.get_item(&names.assets, "missing-key").await.unwrap().is_none());
}

#[tokio::test]
async fn store_put_of_taken_key_keeps_original() {
    let (store, names) = provisioned_store().await;
    let original = stamp(asset("resume", "/cv.pdf"), 10);
    store
        .put_item(&names.assets, to_document(&original).unwrap())
        .await
        .unwrap();

    let mut clash = stamp(asset("resume", "/other.pdf"), 20);
    clash.id = original.id;
    let err = store
        .put_item(&names.assets, to_document(&clash).unwrap())
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::ConditionFailed { .. }));
    let stored = store
        .get_item(&names.assets, &original.id.to_string())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get("url"), Some(&json!("/cv.pdf")));
}

#[tokio::test]
async fn provisioning_twice_is_a_noop() {
    let (store, names) = provisioned_store().await;

    let report = provision_site_schema(&store, &names).await.unwrap();

    assert!(report.is_noop());
    assert_eq!(store.list_collections().await.unwrap().len(), 7);
}
