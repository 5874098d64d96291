//! Core persistence layer for the folio site.
//! Every record kind is stored through the generic item engine in `repo`.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use config::{CollectionNames, ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_env, logging_status};
pub use model::item::{Document, FieldMap, Item, ItemId};
pub use model::records::{
    Asset, AssetPatch, BlogPost, BlogPostPatch, CaseStudy, CaseStudyPatch, Download, LogoStory,
    LogoStoryPatch, Project, ProjectPatch, Submission,
};
pub use repo::batch::{BatchFailure, BatchInsertOutcome, ChunkOutcome};
pub use repo::item_repo::{ItemRepository, RepoError, RepoResult};
pub use service::{ServiceError, ServiceResult, SiteServices};
pub use store::{
    get_handle, provision_site_schema, KvStore, SqliteKvStore, StoreError, StoreHandle,
    MAX_BATCH_WRITE_ITEMS,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
