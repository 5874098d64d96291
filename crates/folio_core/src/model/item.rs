//! Universal item envelope.
//!
//! # Responsibility
//! - Define the fixed fields every stored record carries.
//! - Keep the domain payload generic so one engine serves every record kind.
//!
//! # Invariants
//! - `id` is assigned once at insert and never changes or gets reused.
//! - `created_at <= updated_at`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Stable partition key of a stored item.
pub type ItemId = Uuid;

/// Schemaless stored representation of one item.
pub type Document = Map<String, Value>;

/// Arbitrary subset of fields used for partial updates.
pub type FieldMap = Map<String, Value>;

/// Envelope field name for the partition key.
pub const ID_FIELD: &str = "id";
/// Envelope field name for the insert timestamp.
pub const CREATED_AT_FIELD: &str = "created_at";
/// Envelope field name for the last-update timestamp.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// Fields owned by the envelope; payloads must never carry them.
pub const ENVELOPE_FIELDS: [&str; 3] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD];

/// One stored record: envelope plus typed domain payload.
///
/// The payload is flattened on the wire, so a stored blog post reads as
/// `{"id": .., "created_at": .., "updated_at": .., "slug": .., ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item<T> {
    pub id: ItemId,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds.
    pub updated_at: i64,
    #[serde(flatten)]
    pub fields: T,
}

impl<T> Item<T> {
    /// Returns the id in the hyphenated form stored as the partition key.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}
