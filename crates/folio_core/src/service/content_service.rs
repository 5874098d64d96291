//! Slug-addressed content façades (blog posts, projects, case studies, logo
//! stories).
//!
//! # Responsibility
//! - Create, read, update and delete content by slug through the slug index.
//! - Keep slugs well-formed and unique per collection.
//! - Order listings the way each page shows them.
//!
//! # Invariants
//! - A slug is lowercase ASCII words joined by single hyphens.
//! - Create, import and slug-changing updates reject slugs already in use.
//! - Delete by slug is idempotent.

use crate::config::{SLUG_FIELD, SLUG_INDEX};
use crate::model::codec::payload_fields;
use crate::model::item::{Item, ItemId};
use crate::model::records::{
    BlogPost, BlogPostPatch, CaseStudy, CaseStudyPatch, LogoStory, LogoStoryPatch, Project,
    ProjectPatch,
};
use crate::repo::item_repo::ItemRepository;
use crate::service::{ServiceError, ServiceResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeSet;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));

const MAX_SLUG_CHARS: usize = 96;

/// Content kind stored in a slug-indexed collection.
pub trait ContentRecord: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Typed partial update for this kind.
    type Patch: Serialize + Send + Sync;

    /// Singular noun used in errors and log lines.
    const KIND: &'static str;

    fn slug(&self) -> &str;

    /// Whether the record is visible on public pages.
    fn is_published(&self) -> bool {
        true
    }

    /// Listing order for this kind's index page.
    fn listing_order(a: &Item<Self>, b: &Item<Self>) -> Ordering {
        b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
    }
}

impl ContentRecord for BlogPost {
    type Patch = BlogPostPatch;
    const KIND: &'static str = "blog post";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn is_published(&self) -> bool {
        self.published
    }

    /// Newest publication first; unpublished drafts fall back to creation time.
    fn listing_order(a: &Item<Self>, b: &Item<Self>) -> Ordering {
        let published_at = |item: &Item<Self>| item.fields.published_at.unwrap_or(item.created_at);
        published_at(b)
            .cmp(&published_at(a))
            .then_with(|| a.id.cmp(&b.id))
    }
}

impl ContentRecord for Project {
    type Patch = ProjectPatch;
    const KIND: &'static str = "project";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn listing_order(a: &Item<Self>, b: &Item<Self>) -> Ordering {
        a.fields
            .sort_order
            .cmp(&b.fields.sort_order)
            .then_with(|| a.fields.title.cmp(&b.fields.title))
    }
}

impl ContentRecord for CaseStudy {
    type Patch = CaseStudyPatch;
    const KIND: &'static str = "case study";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn is_published(&self) -> bool {
        self.published
    }
}

impl ContentRecord for LogoStory {
    type Patch = LogoStoryPatch;
    const KIND: &'static str = "logo story";

    fn slug(&self) -> &str {
        &self.slug
    }

    fn is_published(&self) -> bool {
        self.published
    }
}

/// Checks slug format.
pub fn validate_slug(slug: &str) -> ServiceResult<()> {
    if slug.len() > MAX_SLUG_CHARS || !SLUG_RE.is_match(slug) {
        return Err(ServiceError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

/// Façade for one slug-addressed content kind.
pub struct ContentService<T: ContentRecord> {
    repo: ItemRepository<T>,
}

impl<T: ContentRecord> Clone for ContentService<T> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
        }
    }
}

impl<T: ContentRecord> ContentService<T> {
    pub fn new(repo: ItemRepository<T>) -> Self {
        Self { repo }
    }

    /// Engine bound to this kind's collection.
    pub fn repository(&self) -> &ItemRepository<T> {
        &self.repo
    }

    /// Creates a record after checking its slug.
    ///
    /// # Errors
    /// - `InvalidSlug`, `DuplicateSlug`, or engine failures.
    pub async fn create(&self, record: T) -> ServiceResult<Item<T>> {
        validate_slug(record.slug())?;
        self.ensure_slug_free(record.slug(), None).await?;
        let item = self.repo.insert(record).await?;
        info!(
            "event=content_create module=service status=ok kind={} collection={} id={}",
            T::KIND,
            self.repo.collection(),
            item.id
        );
        Ok(item)
    }

    pub async fn get(&self, id: ItemId) -> ServiceResult<Option<Item<T>>> {
        Ok(self.repo.fetch(id).await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> ServiceResult<Option<Item<T>>> {
        Ok(self.repo.find_by_field(SLUG_INDEX, SLUG_FIELD, slug).await?)
    }

    /// All records in listing order, drafts included.
    pub async fn list(&self) -> ServiceResult<Vec<Item<T>>> {
        let mut items = self.repo.scan_all().await?;
        items.sort_by(T::listing_order);
        Ok(items)
    }

    /// Published records in listing order.
    pub async fn list_published(&self) -> ServiceResult<Vec<Item<T>>> {
        let mut items = self.list().await?;
        items.retain(|item| item.fields.is_published());
        Ok(items)
    }

    /// Applies `patch` to the record currently holding `slug`.
    ///
    /// # Errors
    /// - `NotFound` when no record holds `slug` (or it vanished mid-update).
    /// - `InvalidSlug`/`DuplicateSlug` when the patch renames the slug badly.
    pub async fn update_by_slug(&self, slug: &str, patch: &T::Patch) -> ServiceResult<Item<T>> {
        let current = self
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| self.not_found(slug))?;

        let fields = payload_fields(patch)?;
        if let Some(renamed) = fields.get(SLUG_FIELD) {
            let Value::String(new_slug) = renamed else {
                return Err(ServiceError::InvalidSlug(renamed.to_string()));
            };
            if new_slug != slug {
                validate_slug(new_slug)?;
                self.ensure_slug_free(new_slug, Some(current.id)).await?;
            }
        }

        self.repo
            .update(current.id, &fields)
            .await?
            .ok_or_else(|| self.not_found(slug))
    }

    /// Deletes the record holding `slug`; `false` when there was none.
    pub async fn delete_by_slug(&self, slug: &str) -> ServiceResult<bool> {
        match self.get_by_slug(slug).await? {
            Some(item) => Ok(self.repo.remove(item.id).await?),
            None => Ok(false),
        }
    }

    /// Bulk-creates records (e.g. a content migration) through batch insert.
    ///
    /// Slugs are checked against each other and against stored records
    /// before anything is written.
    pub async fn import(&self, records: Vec<T>) -> ServiceResult<Vec<Item<T>>> {
        let mut seen = BTreeSet::new();
        for record in &records {
            validate_slug(record.slug())?;
            if !seen.insert(record.slug().to_string()) {
                return Err(ServiceError::DuplicateSlug(record.slug().to_string()));
            }
            self.ensure_slug_free(record.slug(), None).await?;
        }
        Ok(self.repo.batch_insert(records).await?)
    }

    async fn ensure_slug_free(&self, slug: &str, owner: Option<ItemId>) -> ServiceResult<()> {
        match self.get_by_slug(slug).await? {
            Some(existing) if Some(existing.id) != owner => {
                Err(ServiceError::DuplicateSlug(slug.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn not_found(&self, slug: &str) -> ServiceError {
        ServiceError::NotFound {
            kind: T::KIND,
            key: slug.to_string(),
        }
    }
}

impl ContentService<Project> {
    /// Featured projects in display order.
    pub async fn list_featured(&self) -> ServiceResult<Vec<Item<Project>>> {
        let mut items = self.list().await?;
        items.retain(|item| item.fields.featured);
        Ok(items)
    }
}

impl ContentService<BlogPost> {
    /// Published posts carrying `tag` (case-insensitive), newest first.
    pub async fn list_published_with_tag(&self, tag: &str) -> ServiceResult<Vec<Item<BlogPost>>> {
        let wanted = tag.trim().to_lowercase();
        let mut items = self.list_published().await?;
        items.retain(|item| {
            item.fields
                .tags
                .iter()
                .any(|candidate| candidate.to_lowercase() == wanted)
        });
        Ok(items)
    }
}
