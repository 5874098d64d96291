//! Asset façade and named singleton resolution.
//!
//! # Responsibility
//! - Store metadata for uploaded files.
//! - Resolve a logical asset name (e.g. `resume`) to the location of its
//!   newest active upload.
//!
//! # Invariants
//! - Name resolution never fails: any miss or store error yields the
//!   caller's default location.

use crate::config::{NAME_FIELD, NAME_INDEX};
use crate::logging::log_value;
use crate::model::item::{FieldMap, Item, ItemId};
use crate::model::records::{Asset, AssetPatch};
use crate::repo::item_repo::ItemRepository;
use crate::service::{ServiceError, ServiceResult};
use log::{debug, warn};
use serde_json::Value;

pub const RESUME_ASSET_NAME: &str = "resume";
pub const DEFAULT_RESUME_LOCATION: &str = "/resume.pdf";

#[derive(Clone)]
pub struct AssetService {
    repo: ItemRepository<Asset>,
}

impl AssetService {
    pub fn new(repo: ItemRepository<Asset>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &ItemRepository<Asset> {
        &self.repo
    }

    /// Registers uploaded file metadata.
    pub async fn create(&self, asset: Asset) -> ServiceResult<Item<Asset>> {
        if asset.name.trim().is_empty() {
            return Err(ServiceError::InvalidInput("asset name cannot be empty".to_string()));
        }
        if asset.url.trim().is_empty() {
            return Err(ServiceError::InvalidInput("asset url cannot be empty".to_string()));
        }
        Ok(self.repo.insert(asset).await?)
    }

    pub async fn get(&self, id: ItemId) -> ServiceResult<Option<Item<Asset>>> {
        Ok(self.repo.fetch(id).await?)
    }

    /// All assets, newest first.
    pub async fn list(&self) -> ServiceResult<Vec<Item<Asset>>> {
        let mut items = self.repo.scan_all().await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Returns `None` when `id` does not exist.
    pub async fn update(&self, id: ItemId, patch: &AssetPatch) -> ServiceResult<Option<Item<Asset>>> {
        if patch.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(ServiceError::InvalidInput("asset name cannot be empty".to_string()));
        }
        Ok(self.repo.update_with(id, patch).await?)
    }

    /// Stops serving an asset by name without deleting its metadata.
    pub async fn deactivate(&self, id: ItemId) -> ServiceResult<Option<Item<Asset>>> {
        let mut fields = FieldMap::new();
        fields.insert("active".to_string(), Value::Bool(false));
        Ok(self.repo.update(id, &fields).await?)
    }

    pub async fn delete(&self, id: ItemId) -> ServiceResult<bool> {
        Ok(self.repo.remove(id).await?)
    }

    /// Newest active asset registered under `name`.
    pub async fn find_active_by_name(&self, name: &str) -> ServiceResult<Option<Item<Asset>>> {
        let candidates = self
            .repo
            .query_by_field(NAME_INDEX, NAME_FIELD, name)
            .await?;
        Ok(candidates.into_iter().find(|item| item.fields.active))
    }

    /// Location of the newest active asset named `name`, or `default`.
    ///
    /// Serves the public download path, so lookup failures are logged and
    /// degrade to `default` instead of propagating.
    pub async fn resolve_location(&self, name: &str, default: &str) -> String {
        match self.find_active_by_name(name).await {
            Ok(Some(item)) => item.fields.url,
            Ok(None) => {
                debug!(
                    "event=asset_resolve module=service status=fallback reason=no_active_asset name={name}"
                );
                default.to_string()
            }
            Err(err) => {
                warn!(
                    "event=asset_resolve module=service status=fallback reason=lookup_failed name={name} error={}",
                    log_value(&err)
                );
                default.to_string()
            }
        }
    }

    /// Current resume download location.
    pub async fn resolve_resume_location(&self) -> String {
        self.resolve_location(RESUME_ASSET_NAME, DEFAULT_RESUME_LOCATION)
            .await
    }
}
