//! Record-kind façades over the generic item engine.
//!
//! # Responsibility
//! - Bind each record kind to its collection and payload type.
//! - Enforce payload shape and alternate-key conventions (slug/name) the
//!   store itself does not enforce.
//! - Provide the derived read helpers used by public pages.
//!
//! # Invariants
//! - Façades never bypass the engine's envelope stamping.
//! - Slug uniqueness is checked here, not by the store.

use crate::config::CollectionNames;
use crate::model::codec::CodecError;
use crate::model::records::{BlogPost, CaseStudy, LogoStory, Project};
use crate::repo::item_repo::{ItemRepository, RepoError};
use crate::store::StoreHandle;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod asset_service;
pub mod content_service;
pub mod download_service;
pub mod submission_service;

pub use asset_service::AssetService;
pub use content_service::{ContentRecord, ContentService};
pub use download_service::{AssetDownloadCount, DownloadService};
pub use submission_service::{ReferrerCount, SubmissionService, SubmissionStats};

pub type BlogPostService = ContentService<BlogPost>;
pub type ProjectService = ContentService<Project>;
pub type CaseStudyService = ContentService<CaseStudy>;
pub type LogoStoryService = ContentService<LogoStory>;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Façade-level failure.
#[derive(Debug)]
pub enum ServiceError {
    /// Payload violates the record kind's shape rules.
    InvalidInput(String),
    InvalidSlug(String),
    /// Another item of the same kind already uses this slug.
    DuplicateSlug(String),
    NotFound { kind: &'static str, key: String },
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::InvalidSlug(slug) => write!(
                f,
                "invalid slug `{slug}`: expected lowercase words separated by single hyphens"
            ),
            Self::DuplicateSlug(slug) => write!(f, "slug already in use: {slug}"),
            Self::NotFound { kind, key } => write!(f, "{kind} not found: {key}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<CodecError> for ServiceError {
    fn from(value: CodecError) -> Self {
        Self::Repo(RepoError::Codec(value))
    }
}

/// Every façade, bound to one store handle.
#[derive(Clone)]
pub struct SiteServices {
    pub assets: AssetService,
    pub blog_posts: BlogPostService,
    pub projects: ProjectService,
    pub case_studies: CaseStudyService,
    pub logo_stories: LogoStoryService,
    pub submissions: SubmissionService,
    pub downloads: DownloadService,
}

impl SiteServices {
    pub fn new(handle: &StoreHandle, names: &CollectionNames) -> Self {
        Self {
            assets: AssetService::new(ItemRepository::from_handle(handle, names.assets.as_str())),
            blog_posts: ContentService::new(ItemRepository::from_handle(
                handle,
                names.blog_posts.as_str(),
            )),
            projects: ContentService::new(ItemRepository::from_handle(
                handle,
                names.projects.as_str(),
            )),
            case_studies: ContentService::new(ItemRepository::from_handle(
                handle,
                names.case_studies.as_str(),
            )),
            logo_stories: ContentService::new(ItemRepository::from_handle(
                handle,
                names.logo_stories.as_str(),
            )),
            submissions: SubmissionService::new(ItemRepository::from_handle(
                handle,
                names.submissions.as_str(),
            )),
            downloads: DownloadService::new(ItemRepository::from_handle(
                handle,
                names.downloads.as_str(),
            )),
        }
    }
}
