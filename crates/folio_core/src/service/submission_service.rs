//! Contact-form submissions and their dashboard statistics.
//!
//! # Responsibility
//! - Validate and store form submissions.
//! - Aggregate counts and top referrers for the admin dashboard.
//!
//! # Invariants
//! - Statistics are computed from a full scan; intended for small
//!   collections only.
//! - Referrers are grouped by host; missing or unparseable referrers count
//!   as `direct`.

use crate::model::codec::now_ms;
use crate::model::item::{Item, ItemId};
use crate::model::records::Submission;
use crate::repo::item_repo::ItemRepository;
use crate::service::{ServiceError, ServiceResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Trailing window counted by [`SubmissionStats::last_week_count`].
pub const STATS_WINDOW_MS: i64 = 7 * 24 * 60 * 60 * 1000;
pub const TOP_REFERRER_LIMIT: usize = 5;
pub const DIRECT_REFERRER: &str = "direct";

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("valid email regex"));
static REFERRER_HOST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:([a-z][a-z0-9+.-]*)://)?(?:[^@/?#\s]*@)?([a-z0-9-]+(?:\.[a-z0-9-]+)*)(?::\d+)?(?:[/?#]|$)")
        .expect("valid referrer host regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerCount {
    pub host: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionStats {
    pub total_count: usize,
    /// Submissions created within [`STATS_WINDOW_MS`] of the reference time.
    pub last_week_count: usize,
    /// At most [`TOP_REFERRER_LIMIT`] hosts, most frequent first.
    pub top_referrers: Vec<ReferrerCount>,
}

#[derive(Clone)]
pub struct SubmissionService {
    repo: ItemRepository<Submission>,
}

impl SubmissionService {
    pub fn new(repo: ItemRepository<Submission>) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &ItemRepository<Submission> {
        &self.repo
    }

    /// Stores one form submission.
    ///
    /// # Errors
    /// - `InvalidInput` when name or message is blank, or email is malformed.
    pub async fn submit(&self, submission: Submission) -> ServiceResult<Item<Submission>> {
        validate_submission(&submission)?;
        Ok(self.repo.insert(submission).await?)
    }

    /// Bulk-loads submissions, e.g. from an export of another form backend.
    pub async fn import(&self, submissions: Vec<Submission>) -> ServiceResult<Vec<Item<Submission>>> {
        for submission in &submissions {
            validate_submission(submission)?;
        }
        Ok(self.repo.batch_insert(submissions).await?)
    }

    pub async fn get(&self, id: ItemId) -> ServiceResult<Option<Item<Submission>>> {
        Ok(self.repo.fetch(id).await?)
    }

    /// Submissions newest first.
    pub async fn list_recent(&self) -> ServiceResult<Vec<Item<Submission>>> {
        let mut items = self.repo.scan_all().await?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    pub async fn delete(&self, id: ItemId) -> ServiceResult<bool> {
        Ok(self.repo.remove(id).await?)
    }

    /// Dashboard statistics as of now.
    pub async fn stats(&self) -> ServiceResult<SubmissionStats> {
        self.stats_at(now_ms()).await
    }

    /// Dashboard statistics as of `now_ms`.
    pub async fn stats_at(&self, now_ms: i64) -> ServiceResult<SubmissionStats> {
        let items = self.repo.scan_all().await?;
        Ok(summarize(&items, now_ms))
    }
}

fn validate_submission(submission: &Submission) -> ServiceResult<()> {
    if submission.name.trim().is_empty() {
        return Err(ServiceError::InvalidInput("name cannot be empty".to_string()));
    }
    if submission.message.trim().is_empty() {
        return Err(ServiceError::InvalidInput("message cannot be empty".to_string()));
    }
    if !EMAIL_RE.is_match(submission.email.trim()) {
        return Err(ServiceError::InvalidInput(format!(
            "`{}` is not an email address",
            submission.email
        )));
    }
    Ok(())
}

fn summarize(items: &[Item<Submission>], now_ms: i64) -> SubmissionStats {
    let window_start = now_ms.saturating_sub(STATS_WINDOW_MS);
    let last_week_count = items
        .iter()
        .filter(|item| item.created_at >= window_start)
        .count();

    let mut tally: HashMap<String, usize> = HashMap::new();
    for item in items {
        *tally
            .entry(referrer_host(item.fields.referrer.as_deref()))
            .or_default() += 1;
    }
    let mut top_referrers: Vec<ReferrerCount> = tally
        .into_iter()
        .map(|(host, count)| ReferrerCount { host, count })
        .collect();
    top_referrers.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.host.cmp(&b.host)));
    top_referrers.truncate(TOP_REFERRER_LIMIT);

    SubmissionStats {
        total_count: items.len(),
        last_week_count,
        top_referrers,
    }
}

/// Extracts the grouping host of a raw referrer.
///
/// Lowercased, without port or leading `www.`; `direct` when absent or not a
/// URL. Without a scheme only dotted hosts count, so bare words are `direct`.
pub fn referrer_host(referrer: Option<&str>) -> String {
    let Some(raw) = referrer.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return DIRECT_REFERRER.to_string();
    };
    let lowered = raw.to_ascii_lowercase();
    let Some(captures) = REFERRER_HOST_RE.captures(&lowered) else {
        return DIRECT_REFERRER.to_string();
    };
    let Some(host) = captures.get(2).map(|host| host.as_str()) else {
        return DIRECT_REFERRER.to_string();
    };
    if captures.get(1).is_none() && !host.contains('.') {
        return DIRECT_REFERRER.to_string();
    }
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
