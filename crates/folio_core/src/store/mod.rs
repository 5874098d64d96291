//! Key-value store contract consumed by the item engine.
//!
//! # Responsibility
//! - Describe the managed store the core talks to: point-get, full scan,
//!   conditional put, update-with-expression, delete, batch-write and
//!   index-backed query, all addressed by one partition key (`id`).
//! - Provide the embedded SQLite backend and the memoized handle provider.
//!
//! # Invariants
//! - A batch-write call never carries more than [`MAX_BATCH_WRITE_ITEMS`].
//! - Missing collections and missing indexes are reported as their own error
//!   variants, never as empty results.
//! - Stores never create collections or indexes implicitly.

use crate::db::DbError;
use crate::model::item::Document;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod expression;
pub mod provider;
pub mod schema;
pub mod sqlite;

pub use expression::{UpdateExpression, UpdateExpressionBuilder};
pub use provider::{get_handle, ConnectionProvider, ProviderError, StoreHandle};
pub use schema::{provision_site_schema, ProvisionReport};
pub use sqlite::SqliteKvStore;

/// Hard ceiling of items accepted by one batch-write call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by a store backend.
#[derive(Debug)]
pub enum StoreError {
    CollectionNotFound(String),
    IndexNotProvisioned {
        collection: String,
        index: String,
    },
    /// Index exists but is keyed by a different field than requested.
    IndexKeyMismatch {
        collection: String,
        index: String,
        key_field: String,
        requested: String,
    },
    /// Put/update precondition did not hold.
    ConditionFailed {
        collection: String,
        key: String,
    },
    BatchTooLarge {
        len: usize,
        max: usize,
    },
    InvalidExpression(String),
    InvalidDocument(String),
    /// Schema administration request was rejected.
    InvalidSchema(String),
    Db(DbError),
    Internal(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CollectionNotFound(name) => write!(f, "collection not found: {name}"),
            Self::IndexNotProvisioned { collection, index } => {
                write!(f, "index `{index}` is not provisioned on `{collection}`")
            }
            Self::IndexKeyMismatch {
                collection,
                index,
                key_field,
                requested,
            } => write!(
                f,
                "index `{index}` on `{collection}` is keyed by `{key_field}`, not `{requested}`"
            ),
            Self::ConditionFailed { collection, key } => {
                write!(f, "conditional check failed for `{collection}` item {key}")
            }
            Self::BatchTooLarge { len, max } => {
                write!(f, "batch of {len} items exceeds the {max} item ceiling")
            }
            Self::InvalidExpression(message) => write!(f, "invalid update expression: {message}"),
            Self::InvalidDocument(message) => write!(f, "invalid document: {message}"),
            Self::InvalidSchema(message) => write!(f, "invalid schema request: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Internal(message) => write!(f, "internal store error: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Index-backed query constrained to one key value.
///
/// Matches come back newest first by `created_at`, ties by id ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub collection: String,
    pub index_name: String,
    /// Field the index is expected to be keyed by.
    pub key_field: String,
    pub key_value: String,
    pub limit: Option<usize>,
}

/// Async contract of the partition-keyed item store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the item stored under `key`, or `None`.
    async fn get_item(&self, collection: &str, key: &str) -> StoreResult<Option<Document>>;

    /// Returns every item of the collection in unspecified order.
    async fn scan(&self, collection: &str) -> StoreResult<Vec<Document>>;

    /// Writes one new item; its key is read from the document's `id` field.
    ///
    /// Fails with `ConditionFailed` when the key is already taken.
    async fn put_item(&self, collection: &str, item: Document) -> StoreResult<()>;

    /// Applies `update` to the existing item under `key` and returns the new
    /// image.
    ///
    /// Fails with `ConditionFailed` when the key is absent; nothing is created.
    async fn update_item(
        &self,
        collection: &str,
        key: &str,
        update: &UpdateExpression,
    ) -> StoreResult<Document>;

    /// Deletes the item under `key`; absent keys are not an error.
    async fn delete_item(&self, collection: &str, key: &str) -> StoreResult<()>;

    /// Puts up to [`MAX_BATCH_WRITE_ITEMS`] items atomically for this call.
    async fn batch_write(&self, collection: &str, items: Vec<Document>) -> StoreResult<()>;

    /// Runs an index-backed equality query.
    async fn query_index(&self, query: &IndexQuery) -> StoreResult<Vec<Document>>;
}
