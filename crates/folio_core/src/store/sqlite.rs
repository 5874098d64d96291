//! Embedded SQLite implementation of the [`KvStore`] contract.
//!
//! # Responsibility
//! - Keep items as JSON documents keyed by `(collection, id)`.
//! - Own collection and secondary-index declarations (schema administration).
//! - Run blocking SQLite work off the async executor.
//!
//! # Invariants
//! - Every item operation checks that its collection was created first.
//! - Batch writes and updates are atomic per call (one transaction).
//! - Index queries only run against declared indexes.

use super::{
    IndexQuery, KvStore, StoreError, StoreResult, UpdateExpression, MAX_BATCH_WRITE_ITEMS,
};
use crate::db::{open_db, DbLocation};
use crate::model::codec::now_ms;
use crate::model::item::{Document, ID_FIELD};
use async_trait::async_trait;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::sync::{Arc, Mutex};

static KEY_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid key field regex"));

const QUERY_INDEX_SQL: &str = "SELECT body FROM items
     WHERE collection = ?1 AND json_extract(body, ?2) = ?3
     ORDER BY json_extract(body, '$.created_at') DESC, id ASC
     LIMIT ?4;";

/// SQLite-backed item store shared behind one connection.
#[derive(Clone)]
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteKvStore {
    /// Opens (and migrates) the database at `location`.
    pub fn open(location: &DbLocation) -> StoreResult<Self> {
        Ok(Self::from_connection(open_db(location)?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Declares a collection. Returns `false` when it already existed.
    pub async fn create_collection(&self, name: &str) -> StoreResult<bool> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(StoreError::InvalidSchema(
                "collection name cannot be empty".to_string(),
            ));
        }

        self.run(move |conn| {
            let created = conn.execute(
                "INSERT INTO collections (name, created_at) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING;",
                params![name, now_ms()],
            )? == 1;
            if created {
                info!("event=collection_create module=store status=ok collection={name}");
            }
            Ok(created)
        })
        .await
    }

    /// Declares a secondary index keyed by `key_field`.
    ///
    /// Returns `false` when the same declaration already existed.
    ///
    /// # Errors
    /// - `CollectionNotFound` when the collection was never created.
    /// - `InvalidSchema` when `key_field` is not a plain identifier or the
    ///   index already exists with another key field.
    pub async fn create_index(
        &self,
        collection: &str,
        index_name: &str,
        key_field: &str,
    ) -> StoreResult<bool> {
        if !KEY_FIELD_RE.is_match(key_field) {
            return Err(StoreError::InvalidSchema(format!(
                "index key field `{key_field}` must be a plain identifier"
            )));
        }
        let collection = collection.to_string();
        let index_name = index_name.trim().to_string();
        let key_field = key_field.to_string();
        if index_name.is_empty() {
            return Err(StoreError::InvalidSchema(
                "index name cannot be empty".to_string(),
            ));
        }

        self.run(move |conn| {
            require_collection(conn, &collection)?;
            if let Some(existing) = index_key_field(conn, &collection, &index_name)? {
                if existing == key_field {
                    return Ok(false);
                }
                return Err(StoreError::InvalidSchema(format!(
                    "index `{index_name}` on `{collection}` is already keyed by `{existing}`"
                )));
            }
            conn.execute(
                "INSERT INTO collection_indexes (collection, index_name, key_field)
                 VALUES (?1, ?2, ?3);",
                params![collection, index_name, key_field],
            )?;
            info!(
                "event=index_create module=store status=ok collection={collection} index={index_name} key_field={key_field}"
            );
            Ok(true)
        })
        .await
    }

    /// Lists declared collection names, sorted.
    pub async fn list_collections(&self) -> StoreResult<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name ASC;")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })
        .await
    }

    async fn run<F, R>(&self, task: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Connection) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Internal("store connection lock poisoned".to_string()))?;
            task(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Internal(format!("store task failed: {err}")))?
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get_item(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| {
            require_collection(conn, &collection)?;
            load_document(conn, &collection, &key)
        })
        .await
    }

    async fn scan(&self, collection: &str) -> StoreResult<Vec<Document>> {
        let collection = collection.to_string();
        self.run(move |conn| {
            require_collection(conn, &collection)?;
            let mut stmt = conn.prepare("SELECT body FROM items WHERE collection = ?1;")?;
            let bodies = stmt
                .query_map([collection.as_str()], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            bodies
                .iter()
                .map(|body| parse_body(&collection, body))
                .collect()
        })
        .await
    }

    async fn put_item(&self, collection: &str, item: Document) -> StoreResult<()> {
        let collection = collection.to_string();
        self.run(move |conn| {
            require_collection(conn, &collection)?;
            let key = document_key(&item)?;
            let body = encode_body(&item)?;
            let inserted = conn.execute(
                "INSERT INTO items (collection, id, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, id) DO NOTHING;",
                params![collection, key, body],
            )?;
            if inserted == 0 {
                return Err(StoreError::ConditionFailed { collection, key });
            }
            Ok(())
        })
        .await
    }

    async fn update_item(
        &self,
        collection: &str,
        key: &str,
        update: &UpdateExpression,
    ) -> StoreResult<Document> {
        let assignments = update.resolve()?;
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            require_collection(&tx, &collection)?;
            let Some(mut document) = load_document(&tx, &collection, &key)? else {
                return Err(StoreError::ConditionFailed { collection, key });
            };
            for (attribute, value) in assignments {
                document.insert(attribute, value);
            }
            upsert_body(&tx, &collection, &key, &encode_body(&document)?)?;
            tx.commit()?;
            Ok(document)
        })
        .await
    }

    async fn delete_item(&self, collection: &str, key: &str) -> StoreResult<()> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.run(move |conn| {
            require_collection(conn, &collection)?;
            conn.execute(
                "DELETE FROM items WHERE collection = ?1 AND id = ?2;",
                params![collection, key],
            )?;
            Ok(())
        })
        .await
    }

    async fn batch_write(&self, collection: &str, items: Vec<Document>) -> StoreResult<()> {
        if items.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StoreError::BatchTooLarge {
                len: items.len(),
                max: MAX_BATCH_WRITE_ITEMS,
            });
        }
        let collection = collection.to_string();
        self.run(move |conn| {
            let rows = items
                .iter()
                .map(|item| Ok((document_key(item)?, encode_body(item)?)))
                .collect::<StoreResult<Vec<_>>>()?;

            let tx = conn.transaction()?;
            require_collection(&tx, &collection)?;
            for (key, body) in &rows {
                upsert_body(&tx, &collection, key, body)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn query_index(&self, query: &IndexQuery) -> StoreResult<Vec<Document>> {
        let query = query.clone();
        self.run(move |conn| {
            require_collection(conn, &query.collection)?;
            let key_field = index_key_field(conn, &query.collection, &query.index_name)?
                .ok_or_else(|| StoreError::IndexNotProvisioned {
                    collection: query.collection.clone(),
                    index: query.index_name.clone(),
                })?;
            if key_field != query.key_field {
                return Err(StoreError::IndexKeyMismatch {
                    collection: query.collection.clone(),
                    index: query.index_name.clone(),
                    key_field,
                    requested: query.key_field.clone(),
                });
            }

            let limit = query
                .limit
                .and_then(|limit| i64::try_from(limit).ok())
                .unwrap_or(-1);
            let mut stmt = conn.prepare(QUERY_INDEX_SQL)?;
            let bodies = stmt
                .query_map(
                    params![
                        query.collection,
                        format!("$.{key_field}"),
                        query.key_value,
                        limit
                    ],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<Result<Vec<_>, _>>()?;
            bodies
                .iter()
                .map(|body| parse_body(&query.collection, body))
                .collect()
        })
        .await
    }
}

fn require_collection(conn: &Connection, collection: &str) -> StoreResult<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1);",
        [collection],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::CollectionNotFound(collection.to_string()))
    }
}

fn index_key_field(
    conn: &Connection,
    collection: &str,
    index_name: &str,
) -> StoreResult<Option<String>> {
    let key_field = conn
        .query_row(
            "SELECT key_field FROM collection_indexes
             WHERE collection = ?1 AND index_name = ?2;",
            params![collection, index_name],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    Ok(key_field)
}

fn load_document(conn: &Connection, collection: &str, key: &str) -> StoreResult<Option<Document>> {
    let body = conn
        .query_row(
            "SELECT body FROM items WHERE collection = ?1 AND id = ?2;",
            params![collection, key],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    body.map(|body| parse_body(collection, &body)).transpose()
}

fn upsert_body(conn: &Connection, collection: &str, key: &str, body: &str) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO items (collection, id, body) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body;",
        params![collection, key, body],
    )?;
    Ok(())
}

fn document_key(document: &Document) -> StoreResult<String> {
    match document.get(ID_FIELD) {
        Some(Value::String(key)) if !key.is_empty() => Ok(key.clone()),
        _ => Err(StoreError::InvalidDocument(
            "item must carry a non-empty string `id`".to_string(),
        )),
    }
}

fn encode_body(document: &Document) -> StoreResult<String> {
    serde_json::to_string(document)
        .map_err(|err| StoreError::InvalidDocument(format!("cannot encode item: {err}")))
}

fn parse_body(collection: &str, body: &str) -> StoreResult<Document> {
    serde_json::from_str(body).map_err(|err| {
        StoreError::InvalidDocument(format!("stored item in `{collection}` is not an object: {err}"))
    })
}
