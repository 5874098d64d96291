//! Secondary-index lookups layered on the item engine.
//!
//! # Responsibility
//! - Resolve items by an alternate key (`slug`, `name`) through a declared
//!   store index.
//!
//! # Invariants
//! - Results are ordered newest-first by `created_at`, ties by id.
//! - A missing index is `RepoError::IndexNotProvisioned`, never "no match".
//! - Index provisioning is an external precondition.

use crate::model::item::Item;
use crate::repo::item_repo::{ItemRepository, RepoResult};
use crate::store::IndexQuery;
use serde::de::DeserializeOwned;
use serde::Serialize;

impl<T> ItemRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Returns the newest item whose `field_name` equals `value`.
    pub async fn find_by_field(
        &self,
        index_name: &str,
        field_name: &str,
        value: &str,
    ) -> RepoResult<Option<Item<T>>> {
        let mut matches = self
            .index_query(index_name, field_name, value, Some(1))
            .await?;
        Ok(matches.pop())
    }

    /// Returns every item whose `field_name` equals `value`, newest first.
    pub async fn query_by_field(
        &self,
        index_name: &str,
        field_name: &str,
        value: &str,
    ) -> RepoResult<Vec<Item<T>>> {
        self.index_query(index_name, field_name, value, None).await
    }

    async fn index_query(
        &self,
        index_name: &str,
        field_name: &str,
        value: &str,
        limit: Option<usize>,
    ) -> RepoResult<Vec<Item<T>>> {
        let query = IndexQuery {
            collection: self.collection.clone(),
            index_name: index_name.to_string(),
            key_field: field_name.to_string(),
            key_value: value.to_string(),
            limit,
        };
        let documents = match self
            .call("query", self.store.query_index(&query))
            .await?
        {
            Ok(documents) => documents,
            Err(err) => return Err(self.fail("query", err)),
        };
        documents
            .into_iter()
            .map(|document| self.decode(document))
            .collect()
    }
}
