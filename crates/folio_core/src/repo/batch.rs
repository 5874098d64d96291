//! Per-chunk results of a batch insert.
//!
//! # Invariants
//! - A chunk is atomic for store errors: a chunk that failed with a store
//!   error wrote nothing. A timed-out chunk may or may not have committed.
//! - The batch as a whole is reported failed if any chunk failed; committed
//!   chunks are not rolled back.

use crate::model::item::{Item, ItemId};
use crate::repo::item_repo::{RepoError, RepoResult};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// Result of one batch-write call.
#[derive(Debug)]
pub struct ChunkOutcome {
    /// Position of the chunk in dispatch order.
    pub index: usize,
    pub item_ids: Vec<ItemId>,
    /// `None` when the chunk was acknowledged.
    pub error: Option<RepoError>,
}

impl ChunkOutcome {
    pub fn is_committed(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the chunk may have been written despite reporting failure.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self.error, Some(RepoError::Timeout { .. }))
    }
}

/// Failed chunk carried inside [`RepoError::BatchIncomplete`].
#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub item_ids: Vec<ItemId>,
    pub error: Box<RepoError>,
}

/// Summary of a batch insert that did not fully commit.
#[derive(Debug)]
pub struct BatchFailure {
    pub collection: String,
    pub total_chunks: usize,
    /// Ids written by acknowledged chunks.
    pub committed: Vec<ItemId>,
    pub failed: Vec<ChunkFailure>,
}

impl BatchFailure {
    /// Ids of every item in a failed chunk.
    pub fn failed_ids(&self) -> Vec<ItemId> {
        self.failed
            .iter()
            .flat_map(|chunk| chunk.item_ids.iter().copied())
            .collect()
    }
}

impl Display for BatchFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "batch insert into `{}` incomplete: {} of {} chunks failed ({} items committed)",
            self.collection,
            self.failed.len(),
            self.total_chunks,
            self.committed.len()
        )?;
        if let Some(first) = self.failed.first() {
            write!(f, "; chunk {}: {}", first.index, first.error)?;
        }
        Ok(())
    }
}

/// Stamped items of a batch plus the outcome of every chunk.
#[derive(Debug)]
pub struct BatchInsertOutcome<T> {
    collection: String,
    items: Vec<Item<T>>,
    chunks: Vec<ChunkOutcome>,
}

impl<T> BatchInsertOutcome<T> {
    pub(crate) fn new(collection: String, items: Vec<Item<T>>, chunks: Vec<ChunkOutcome>) -> Self {
        Self {
            collection,
            items,
            chunks,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_committed)
    }

    /// Every stamped item, in input order, committed or not.
    pub fn items(&self) -> &[Item<T>] {
        &self.items
    }

    pub fn chunks(&self) -> &[ChunkOutcome] {
        &self.chunks
    }

    /// Payloads of the failed items, ready to be submitted again.
    pub fn into_failed_payloads(self) -> Vec<T> {
        let failed: HashSet<ItemId> = self
            .chunks
            .iter()
            .filter(|chunk| !chunk.is_committed())
            .flat_map(|chunk| chunk.item_ids.iter().copied())
            .collect();
        self.items
            .into_iter()
            .filter(|item| failed.contains(&item.id))
            .map(|item| item.fields)
            .collect()
    }

    /// Collapses the outcome: all items on success, `BatchIncomplete` otherwise.
    pub fn into_result(self) -> RepoResult<Vec<Item<T>>> {
        if self.is_complete() {
            return Ok(self.items);
        }

        let total_chunks = self.chunks.len();
        let mut committed = Vec::new();
        let mut failed = Vec::new();
        for chunk in self.chunks {
            match chunk.error {
                None => committed.extend(chunk.item_ids),
                Some(error) => failed.push(ChunkFailure {
                    index: chunk.index,
                    item_ids: chunk.item_ids,
                    error: Box::new(error),
                }),
            }
        }

        Err(RepoError::BatchIncomplete(BatchFailure {
            collection: self.collection,
            total_chunks,
            committed,
            failed,
        }))
    }
}
