//! Environment configuration for the store handle and collection names.
//!
//! # Responsibility
//! - Read store region/location/timeout settings, failing fast when absent.
//! - Resolve collection names with development defaults.
//! - Name the secondary indexes the core expects to exist.
//!
//! # Invariants
//! - Missing store settings are a `ConfigError`, never a deferred failure.
//! - Collection names always resolve; defaults need zero configuration.

use crate::db::DbLocation;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_STORE_REGION: &str = "FOLIO_STORE_REGION";
pub const ENV_STORE_PATH: &str = "FOLIO_STORE_PATH";
pub const ENV_STORE_CALL_TIMEOUT_MS: &str = "FOLIO_STORE_CALL_TIMEOUT_MS";

pub const ENV_TABLE_ASSETS: &str = "FOLIO_TABLE_ASSETS";
pub const ENV_TABLE_BLOG_POSTS: &str = "FOLIO_TABLE_BLOG_POSTS";
pub const ENV_TABLE_PROJECTS: &str = "FOLIO_TABLE_PROJECTS";
pub const ENV_TABLE_CASE_STUDIES: &str = "FOLIO_TABLE_CASE_STUDIES";
pub const ENV_TABLE_LOGO_STORIES: &str = "FOLIO_TABLE_LOGO_STORIES";
pub const ENV_TABLE_SUBMISSIONS: &str = "FOLIO_TABLE_SUBMISSIONS";
pub const ENV_TABLE_DOWNLOADS: &str = "FOLIO_TABLE_DOWNLOADS";

/// Secondary index keyed by `slug` (content collections).
pub const SLUG_INDEX: &str = "slug-index";
pub const SLUG_FIELD: &str = "slug";
/// Secondary index keyed by `name` (assets).
pub const NAME_INDEX: &str = "name-index";
pub const NAME_FIELD: &str = "name";

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

static REGION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2}(-[a-z0-9]+)+$").expect("valid region regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(key) => write!(f, "missing required setting `{key}`"),
            Self::Invalid { key, reason } => write!(f, "invalid setting `{key}`: {reason}"),
        }
    }
}

impl Error for ConfigError {}

/// Settings needed to construct the store handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Deployment region, e.g. `eu-west-1`.
    pub region: String,
    pub location: DbLocation,
    /// Upper bound applied to every single store call.
    pub call_timeout: Duration,
}

impl StoreConfig {
    /// Reads store settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads store settings through `lookup`.
    ///
    /// # Errors
    /// - `Missing` when region or path is unset or blank.
    /// - `Invalid` when region is malformed or the timeout is not a positive
    ///   integer.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let region = required(&lookup, ENV_STORE_REGION)?;
        if !REGION_RE.is_match(&region) {
            return Err(ConfigError::Invalid {
                key: ENV_STORE_REGION,
                reason: format!("`{region}` is not a region name"),
            });
        }
        let location = DbLocation::parse(&required(&lookup, ENV_STORE_PATH)?);

        let call_timeout = match non_blank(&lookup, ENV_STORE_CALL_TIMEOUT_MS) {
            None => DEFAULT_CALL_TIMEOUT,
            Some(raw) => match raw.parse::<u64>() {
                Ok(millis) if millis > 0 => Duration::from_millis(millis),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_STORE_CALL_TIMEOUT_MS,
                        reason: format!("`{raw}` is not a positive millisecond count"),
                    })
                }
            },
        };

        Ok(Self {
            region,
            location,
            call_timeout,
        })
    }
}

/// Backing collection name per record kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionNames {
    pub assets: String,
    pub blog_posts: String,
    pub projects: String,
    pub case_studies: String,
    pub logo_stories: String,
    pub submissions: String,
    pub downloads: String,
}

impl Default for CollectionNames {
    fn default() -> Self {
        Self {
            assets: "folio-assets".to_string(),
            blog_posts: "folio-blog-posts".to_string(),
            projects: "folio-projects".to_string(),
            case_studies: "folio-case-studies".to_string(),
            logo_stories: "folio-logo-stories".to_string(),
            submissions: "folio-submissions".to_string(),
            downloads: "folio-downloads".to_string(),
        }
    }
}

impl CollectionNames {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves each name through `lookup`, keeping the default when unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let pick = |key: &str, fallback: String| non_blank(&lookup, key).unwrap_or(fallback);
        Self {
            assets: pick(ENV_TABLE_ASSETS, defaults.assets),
            blog_posts: pick(ENV_TABLE_BLOG_POSTS, defaults.blog_posts),
            projects: pick(ENV_TABLE_PROJECTS, defaults.projects),
            case_studies: pick(ENV_TABLE_CASE_STUDIES, defaults.case_studies),
            logo_stories: pick(ENV_TABLE_LOGO_STORIES, defaults.logo_stories),
            submissions: pick(ENV_TABLE_SUBMISSIONS, defaults.submissions),
            downloads: pick(ENV_TABLE_DOWNLOADS, defaults.downloads),
        }
    }

    /// Collections served through the slug index.
    pub fn slug_indexed(&self) -> [&str; 4] {
        [
            &self.blog_posts,
            &self.projects,
            &self.case_studies,
            &self.logo_stories,
        ]
    }

    /// Every collection name.
    pub fn all(&self) -> [&str; 7] {
        [
            &self.assets,
            &self.blog_posts,
            &self.projects,
            &self.case_studies,
            &self.logo_stories,
            &self.submissions,
            &self.downloads,
        ]
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<String, ConfigError> {
    non_blank(lookup, key).ok_or(ConfigError::Missing(key))
}
