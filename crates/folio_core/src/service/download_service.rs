//! Download log for served assets.

use crate::model::item::Item;
use crate::model::records::Download;
use crate::repo::item_repo::ItemRepository;
use crate::service::{ServiceError, ServiceResult};
use std::collections::HashMap;

/// Number of recorded downloads for one asset name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetDownloadCount {
    pub asset_name: String,
    pub count: usize,
}

#[derive(Clone)]
pub struct DownloadService {
    repo: ItemRepository<Download>,
}

impl DownloadService {
    pub fn new(repo: ItemRepository<Download>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &ItemRepository<Download> {
        &self.repo
    }

    /// Records one download event.
    ///
    /// # Errors
    /// - `InvalidInput` when `asset_name` is blank.
    pub async fn record(&self, download: Download) -> ServiceResult<Item<Download>> {
        validate_download(&download)?;
        Ok(self.repo.insert(download).await?)
    }

    /// Records a buffered set of download events in as few store calls as
    /// the batch ceiling allows.
    pub async fn record_many(&self, downloads: Vec<Download>) -> ServiceResult<Vec<Item<Download>>> {
        for download in &downloads {
            validate_download(download)?;
        }
        Ok(self.repo.batch_insert(downloads).await?)
    }

    pub async fn list_recent(&self) -> ServiceResult<Vec<Item<Download>>> {
        let mut items = self.repo.scan_all().await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Per-asset totals, most downloaded first.
    pub async fn counts_by_asset(&self) -> ServiceResult<Vec<AssetDownloadCount>> {
        let items = self.repo.scan_all().await?;
        Ok(tally_by_asset(&items))
    }
}

fn validate_download(download: &Download) -> ServiceResult<()> {
    if download.asset_name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "asset_name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn tally_by_asset(items: &[Item<Download>]) -> Vec<AssetDownloadCount> {
    let mut tally: HashMap<&str, usize> = HashMap::new();
    for item in items {
        *tally.entry(item.fields.asset_name.as_str()).or_default() += 1;
    }
    let mut counts: Vec<AssetDownloadCount> = tally
        .into_iter()
        .map(|(asset_name, count)| AssetDownloadCount {
            asset_name: asset_name.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.asset_name.cmp(&b.asset_name))
    });
    counts
}

#[cfg(test)]
mod tests {
    use super::{tally_by_asset, validate_download};
    use crate::model::codec::stamp;
    use crate::model::records::Download;

    fn download(asset_name: &str) -> Download {
        Download {
            asset_name: asset_name.to_string(),
            referrer: None,
            user_agent: None,
        }
    }

    #[test]
    fn tally_orders_by_count_then_name() {
        let items: Vec<_> = ["resume", "brochure", "resume", "avatar"]
            .into_iter()
            .map(|name| stamp(download(name), 1))
            .collect();

        let counts = tally_by_asset(&items);
        let flat: Vec<(&str, usize)> = counts
            .iter()
            .map(|entry| (entry.asset_name.as_str(), entry.count))
            .collect();
        assert_eq!(flat, vec![("resume", 2), ("avatar", 1), ("brochure", 1)]);
    }

    #[test]
    fn blank_asset_name_is_rejected() {
        assert!(validate_download(&download("  ")).is_err());
        assert!(validate_download(&download("resume")).is_ok());
    }
}
