//! Site schema provisioning for the embedded backend.
//!
//! Creates the collections and secondary indexes the façades expect. This is
//! an administrative step run by deploy tooling, never by the item engine.

use super::sqlite::SqliteKvStore;
use super::StoreResult;
use crate::config::{CollectionNames, NAME_FIELD, NAME_INDEX, SLUG_FIELD, SLUG_INDEX};
use log::info;

/// What a provisioning run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    pub created_collections: Vec<String>,
    /// `(collection, index)` pairs.
    pub created_indexes: Vec<(String, String)>,
}

impl ProvisionReport {
    pub fn is_noop(&self) -> bool {
        self.created_collections.is_empty() && self.created_indexes.is_empty()
    }
}

/// Ensures every site collection and index exists. Safe to re-run.
pub async fn provision_site_schema(
    store: &SqliteKvStore,
    names: &CollectionNames,
) -> StoreResult<ProvisionReport> {
    let mut report = ProvisionReport::default();

    for collection in names.all() {
        if store.create_collection(collection).await? {
            report.created_collections.push(collection.to_string());
        }
    }
    if store
        .create_index(&names.assets, NAME_INDEX, NAME_FIELD)
        .await?
    {
        report
            .created_indexes
            .push((names.assets.clone(), NAME_INDEX.to_string()));
    }
    for collection in names.slug_indexed() {
        if store.create_index(collection, SLUG_INDEX, SLUG_FIELD).await? {
            report
                .created_indexes
                .push((collection.to_string(), SLUG_INDEX.to_string()));
        }
    }

    info!(
        "event=schema_provision module=store status=ok collections_created={} indexes_created={}",
        report.created_collections.len(),
        report.created_indexes.len()
    );
    Ok(report)
}
