#![allow(dead_code)]

use async_trait::async_trait;
use folio_core::config::CollectionNames;
use folio_core::db::DbLocation;
use folio_core::model::item::Document;
use folio_core::store::{
    provision_site_schema, IndexQuery, KvStore, SqliteKvStore, StoreError, StoreHandle,
    StoreResult, UpdateExpression,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_REGION: &str = "eu-west-1";
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// In-memory store with every site collection and index declared.
pub async fn provisioned_store() -> (SqliteKvStore, CollectionNames) {
    let store = SqliteKvStore::open(&DbLocation::Memory).unwrap();
    let names = CollectionNames::default();
    provision_site_schema(&store, &names).await.unwrap();
    (store, names)
}

pub async fn provisioned_handle() -> (StoreHandle, CollectionNames) {
    let (store, names) = provisioned_store().await;
    (StoreHandle::from_store(TEST_REGION, TEST_TIMEOUT, store), names)
}

/// Delegating store that records the size of every batch-write call and can
/// fail chosen calls.
pub struct RecordingStore {
    inner: SqliteKvStore,
    batch_sizes: Mutex<Vec<usize>>,
    batch_calls: AtomicUsize,
    /// Zero-based batch-write call numbers that fail without writing.
    failing_calls: Vec<usize>,
    batch_delay: Option<Duration>,
}

impl RecordingStore {
    pub fn new(inner: SqliteKvStore) -> Self {
        Self {
            inner,
            batch_sizes: Mutex::new(Vec::new()),
            batch_calls: AtomicUsize::new(0),
            failing_calls: Vec::new(),
            batch_delay: None,
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.failing_calls = calls.to_vec();
        self
    }

    pub fn delaying_batches(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        let mut sizes = self.batch_sizes.lock().unwrap().clone();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }
}

#[async_trait]
impl KvStore for RecordingStore {
    async fn get_item(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        self.inner.get_item(collection, key).await
    }

    async fn scan(&self, collection: &str) -> StoreResult<Vec<Document>> {
        self.inner.scan(collection).await
    }

    async fn put_item(&self, collection: &str, item: Document) -> StoreResult<()> {
        self.inner.put_item(collection, item).await
    }

    async fn update_item(
        &self,
        collection: &str,
        key: &str,
        update: &UpdateExpression,
    ) -> StoreResult<Document> {
        self.inner.update_item(collection, key, update).await
    }

    async fn delete_item(&self, collection: &str, key: &str) -> StoreResult<()> {
        self.inner.delete_item(collection, key).await
    }

    async fn batch_write(&self, collection: &str, items: Vec<Document>) -> StoreResult<()> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(items.len());
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_calls.contains(&call) {
            return Err(StoreError::Internal("injected batch failure".to_string()));
        }
        self.inner.batch_write(collection, items).await
    }

    async fn query_index(&self, query: &IndexQuery) -> StoreResult<Vec<Document>> {
        self.inner.query_index(query).await
    }
}

pub fn shared(store: RecordingStore) -> (Arc<RecordingStore>, Arc<dyn KvStore>) {
    let store = Arc::new(store);
    let kv: Arc<dyn KvStore> = store.clone();
    (store, kv)
}
