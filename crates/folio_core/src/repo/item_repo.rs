//! Generic CRUD engine over the key-value store.
//!
//! # Responsibility
//! - Bind one collection and one payload type to the store contract.
//! - Stamp the envelope on every write.
//! - Synthesize placeholder-bound update expressions from field maps.
//! - Chunk batch inserts to the store's per-call ceiling and fan them out.
//!
//! # Invariants
//! - Absent items are `Ok(None)` (fetch/update) or `Ok(true)` (remove), never
//!   errors.
//! - Updates never send `id` or `created_at` and always bump `updated_at`.
//! - Every store call runs under the configured per-call timeout.
//! - The engine never retries; retry policy belongs to callers.

use crate::logging::log_value;
use crate::model::codec::{
    from_document, now_ms, payload_fields, prepare_update, stamp, to_document, CodecError,
};
use crate::model::item::{Document, FieldMap, Item, ItemId, UPDATED_AT_FIELD};
use crate::repo::batch::{BatchFailure, BatchInsertOutcome, ChunkOutcome};
use crate::store::{
    KvStore, StoreError, StoreHandle, StoreResult, UpdateExpression, MAX_BATCH_WRITE_ITEMS,
};
use futures::future::join_all;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub type RepoResult<T> = Result<T, RepoError>;

/// Engine-level failure for item operations.
#[derive(Debug)]
pub enum RepoError {
    /// Underlying store call failed.
    Store {
        collection: String,
        operation: &'static str,
        source: StoreError,
    },
    /// The secondary index a lookup relies on does not exist.
    IndexNotProvisioned { collection: String, index: String },
    /// Store call did not finish within the per-call timeout.
    Timeout {
        collection: String,
        operation: &'static str,
        timeout_ms: u128,
    },
    /// A freshly generated id was already taken; nothing was overwritten.
    DuplicateId(ItemId),
    Codec(CodecError),
    /// At least one chunk of a batch insert failed.
    BatchIncomplete(BatchFailure),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store {
                collection,
                operation,
                source,
            } => write!(f, "{operation} on `{collection}` failed: {source}"),
            Self::IndexNotProvisioned { collection, index } => {
                write!(f, "index `{index}` is not provisioned on `{collection}`")
            }
            Self::Timeout {
                collection,
                operation,
                timeout_ms,
            } => write!(
                f,
                "{operation} on `{collection}` timed out after {timeout_ms}ms"
            ),
            Self::DuplicateId(id) => write!(f, "item id already exists: {id}"),
            Self::Codec(err) => write!(f, "{err}"),
            Self::BatchIncomplete(failure) => write!(f, "{failure}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store { source, .. } => Some(source),
            Self::Codec(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for RepoError {
    fn from(value: CodecError) -> Self {
        Self::Codec(value)
    }
}

/// Typed data access for one collection.
pub struct ItemRepository<T> {
    pub(super) store: Arc<dyn KvStore>,
    pub(super) collection: String,
    call_timeout: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for ItemRepository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            collection: self.collection.clone(),
            call_timeout: self.call_timeout,
            _payload: PhantomData,
        }
    }
}

impl<T> ItemRepository<T> {
    pub fn new(store: Arc<dyn KvStore>, collection: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            store,
            collection: collection.into(),
            call_timeout,
            _payload: PhantomData,
        }
    }

    /// Binds `collection` on the handle's store with the handle's timeout.
    pub fn from_handle(handle: &StoreHandle, collection: impl Into<String>) -> Self {
        Self::new(handle.kv(), collection, handle.call_timeout())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Runs one store call under the per-call timeout.
    ///
    /// The outer `Err` is a timeout; the inner result is the store's answer.
    pub(super) async fn call<R>(
        &self,
        operation: &'static str,
        request: impl Future<Output = StoreResult<R>>,
    ) -> RepoResult<StoreResult<R>> {
        match tokio::time::timeout(self.call_timeout, request).await {
            Ok(result) => Ok(result),
            Err(_) => {
                let timeout_ms = self.call_timeout.as_millis();
                error!(
                    "event=item_{operation} module=repo status=error error_code=timeout collection={} timeout_ms={timeout_ms}",
                    self.collection
                );
                Err(RepoError::Timeout {
                    collection: self.collection.clone(),
                    operation,
                    timeout_ms,
                })
            }
        }
    }

    /// Logs a store failure with context and lifts it into `RepoError`.
    pub(super) fn fail(&self, operation: &'static str, err: StoreError) -> RepoError {
        error!(
            "event=item_{operation} module=repo status=error collection={} error={}",
            self.collection,
            log_value(&err)
        );
        match err {
            StoreError::IndexNotProvisioned { collection, index } => {
                RepoError::IndexNotProvisioned { collection, index }
            }
            source => RepoError::Store {
                collection: self.collection.clone(),
                operation,
                source,
            },
        }
    }
}

impl<T> ItemRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Point lookup by id.
    pub async fn fetch(&self, id: ItemId) -> RepoResult<Option<Item<T>>> {
        self.fetch_document("fetch", &id.to_string())
            .await?
            .map(|document| self.decode(document))
            .transpose()
    }

    /// Every item in the collection, in no particular order.
    ///
    /// Full scan: meant for small collections only.
    pub async fn scan_all(&self) -> RepoResult<Vec<Item<T>>> {
        let started_at = Instant::now();
        let documents = match self.call("scan", self.store.scan(&self.collection)).await? {
            Ok(documents) => documents,
            Err(err) => return Err(self.fail("scan", err)),
        };
        debug!(
            "event=item_scan module=repo status=ok collection={} items={} duration_ms={}",
            self.collection,
            documents.len(),
            started_at.elapsed().as_millis()
        );
        documents
            .into_iter()
            .map(|document| self.decode(document))
            .collect()
    }

    /// Stores a new item and returns it with its envelope.
    ///
    /// # Errors
    /// - `DuplicateId` if the generated id collides; the stored item is kept.
    /// - `Codec` if the payload serializes an envelope field.
    pub async fn insert(&self, payload: T) -> RepoResult<Item<T>> {
        let item = stamp(payload, now_ms());
        let document = to_document(&item)?;
        match self
            .call(
                "insert",
                self.store.put_item(&self.collection, document),
            )
            .await?
        {
            Ok(()) => {
                debug!(
                    "event=item_insert module=repo status=ok collection={} id={}",
                    self.collection, item.id
                );
                Ok(item)
            }
            Err(StoreError::ConditionFailed { .. }) => {
                warn!(
                    "event=item_insert module=repo status=error error_code=duplicate_id collection={} id={}",
                    self.collection, item.id
                );
                Err(RepoError::DuplicateId(item.id))
            }
            Err(err) => Err(self.fail("insert", err)),
        }
    }

    /// Applies an arbitrary subset of fields to an existing item.
    ///
    /// `id` and `created_at` in `fields` are ignored; `updated_at` is always
    /// refreshed, so an empty map is a valid timestamp bump. Returns the
    /// post-update item, or `None` when `id` does not exist.
    ///
    /// # Errors
    /// - `Codec` when the changed item would no longer decode as `T`; nothing
    ///   is written then.
    pub async fn update(&self, id: ItemId, fields: &FieldMap) -> RepoResult<Option<Item<T>>> {
        let now = now_ms();
        let changes = prepare_update(fields, now);
        let key = id.to_string();

        let Some(mut candidate) = self.fetch_document("update", &key).await? else {
            return Ok(self.update_target_missing(id));
        };
        candidate.extend(changes.clone());
        if let Err(err) = from_document::<T>(candidate) {
            warn!(
                "event=item_update module=repo status=error error_code=invalid_fields collection={} id={id} error={}",
                self.collection,
                log_value(&err)
            );
            return Err(RepoError::Codec(err));
        }

        let expression = build_update_expression(now, changes);
        match self
            .call(
                "update",
                self.store.update_item(&self.collection, &key, &expression),
            )
            .await?
        {
            Ok(document) => Ok(Some(self.decode(document)?)),
            Err(StoreError::ConditionFailed { .. }) => Ok(self.update_target_missing(id)),
            Err(err) => Err(self.fail("update", err)),
        }
    }

    /// Same as [`ItemRepository::update`], taking a typed patch.
    pub async fn update_with<P: Serialize>(
        &self,
        id: ItemId,
        patch: &P,
    ) -> RepoResult<Option<Item<T>>> {
        let fields = payload_fields(patch)?;
        self.update(id, &fields).await
    }

    /// Deletes by id. Deleting an absent id succeeds.
    pub async fn remove(&self, id: ItemId) -> RepoResult<bool> {
        let key = id.to_string();
        match self
            .call("remove", self.store.delete_item(&self.collection, &key))
            .await?
        {
            Ok(()) => Ok(true),
            Err(err) => Err(self.fail("remove", err)),
        }
    }

    /// Inserts many items, failing if any chunk failed.
    ///
    /// Chunks that succeeded stay committed even when the call fails; the
    /// error lists committed and failed ids.
    pub async fn batch_insert(&self, payloads: Vec<T>) -> RepoResult<Vec<Item<T>>> {
        self.batch_insert_detailed(payloads).await?.into_result()
    }

    /// Inserts many items and reports the outcome of every chunk.
    ///
    /// Every payload gets its own id; the batch shares one timestamp. Chunks
    /// of at most [`MAX_BATCH_WRITE_ITEMS`] are written concurrently and the
    /// call returns once all of them finished.
    ///
    /// # Errors
    /// - `Codec` when a payload cannot be encoded; nothing is written then.
    pub async fn batch_insert_detailed(&self, payloads: Vec<T>) -> RepoResult<BatchInsertOutcome<T>> {
        let started_at = Instant::now();
        let now = now_ms();
        let items: Vec<Item<T>> = payloads
            .into_iter()
            .map(|payload| stamp(payload, now))
            .collect();
        let documents = items
            .iter()
            .map(to_document)
            .collect::<Result<Vec<Document>, _>>()?;
        let chunks = into_chunks(documents, MAX_BATCH_WRITE_ITEMS);
        let chunk_count = chunks.len();

        let writes = chunks.into_iter().map(|chunk| async move {
            match self
                .call("batch_write", self.store.batch_write(&self.collection, chunk))
                .await
            {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(self.fail("batch_write", err)),
                Err(timeout) => Some(timeout),
            }
        });
        let results = join_all(writes).await;

        let outcomes: Vec<ChunkOutcome> = results
            .into_iter()
            .zip(items.chunks(MAX_BATCH_WRITE_ITEMS))
            .enumerate()
            .map(|(index, (error, chunk_items))| ChunkOutcome {
                index,
                item_ids: chunk_items.iter().map(|item| item.id).collect(),
                error,
            })
            .collect();

        let failed = outcomes.iter().filter(|chunk| chunk.error.is_some()).count();
        info!(
            "event=item_batch_insert module=repo status={} collection={} items={} chunks={chunk_count} failed_chunks={failed} duration_ms={}",
            if failed == 0 { "ok" } else { "partial" },
            self.collection,
            items.len(),
            started_at.elapsed().as_millis()
        );

        Ok(BatchInsertOutcome::new(self.collection.clone(), items, outcomes))
    }

    async fn fetch_document(&self, operation: &'static str, key: &str) -> RepoResult<Option<Document>> {
        match self
            .call(operation, self.store.get_item(&self.collection, key))
            .await?
        {
            Ok(document) => Ok(document),
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    fn update_target_missing(&self, id: ItemId) -> Option<Item<T>> {
        debug!(
            "event=item_update module=repo status=not_found collection={} id={id}",
            self.collection
        );
        None
    }

    pub(super) fn decode(&self, document: Document) -> RepoResult<Item<T>> {
        from_document(document).map_err(|err| {
            error!(
                "event=item_decode module=repo status=error collection={} error={}",
                self.collection,
                log_value(&err)
            );
            RepoError::Codec(err)
        })
    }
}

/// Turns prepared changes into a `SET` expression, one placeholder pair per
/// field, led by the `updated_at` bump.
fn build_update_expression(now: i64, changes: FieldMap) -> UpdateExpression {
    changes
        .into_iter()
        .filter(|(field, _)| field != UPDATED_AT_FIELD)
        .fold(
            UpdateExpression::builder(UPDATED_AT_FIELD, Value::from(now)),
            |builder, (field, value)| builder.set(field, value),
        )
        .build()
}

fn into_chunks<X>(items: Vec<X>, size: usize) -> Vec<Vec<X>> {
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        chunks.push(remaining.by_ref().take(size).collect());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::{build_update_expression, into_chunks};
    use crate::model::codec::prepare_update;
    use crate::model::item::FieldMap;
    use serde_json::json;

    #[test]
    fn into_chunks_respects_ceiling() {
        let sizes: Vec<usize> = into_chunks((0..26).collect::<Vec<_>>(), 25)
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![25, 1]);
        assert!(into_chunks(Vec::<u8>::new(), 25).is_empty());
        assert_eq!(into_chunks((0..50).collect::<Vec<_>>(), 25).len(), 2);
    }

    #[test]
    fn update_expression_never_names_fields_inline() {
        let mut fields = FieldMap::new();
        fields.insert("size".to_string(), json!(1));
        fields.insert("status".to_string(), json!("draft"));
        fields.insert("id".to_string(), json!("hijack"));

        let expression = build_update_expression(10, prepare_update(&fields, 10));

        assert!(!expression.text().contains("size"));
        assert!(!expression.text().contains("status"));
        let targets: Vec<&String> = expression.names().values().collect();
        assert_eq!(targets.len(), 3);
        assert!(targets.iter().all(|name| name.as_str() != "id"));
        assert!(targets.iter().any(|name| name.as_str() == "updated_at"));
    }
}
