//! Generic data access over the key-value store.
//!
//! # Responsibility
//! - Provide the six item primitives (fetch, scan, insert, update, remove,
//!   batch insert) for any payload type.
//! - Provide secondary-index lookups by alternate key.
//!
//! # Invariants
//! - "Not found" is a value (`None`), not an error.
//! - Store failures carry collection and operation context.

pub mod batch;
pub mod index_query;
pub mod item_repo;
