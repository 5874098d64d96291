//! Item codec: id/timestamp issue and document shaping.
//!
//! # Responsibility
//! - Generate item ids and envelope timestamps.
//! - Convert typed items to and from schemaless store documents.
//! - Merge partial-update fields with the mandatory `updated_at` bump.
//!
//! # Invariants
//! - Pure data shaping; nothing here performs I/O.
//! - `now_ms` never returns the same value twice within a process.
//! - `prepare_update` never mutates its input and never emits `id` or
//!   `created_at`.

use crate::model::item::{
    Document, FieldMap, Item, ItemId, CREATED_AT_FIELD, ENVELOPE_FIELDS, ID_FIELD,
    UPDATED_AT_FIELD,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static LAST_ISSUED_MS: AtomicI64 = AtomicI64::new(0);

/// Document shaping failures.
#[derive(Debug)]
pub enum CodecError {
    /// Payload did not serialize to a JSON object.
    NotAnObject(&'static str),
    /// Payload carries a field owned by the envelope.
    ReservedField(String),
    Json(serde_json::Error),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject(kind) => write!(f, "{kind} must serialize to a JSON object"),
            Self::ReservedField(field) => {
                write!(f, "payload must not set envelope field `{field}`")
            }
            Self::Json(err) => write!(f, "json: {err}"),
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Generates a fresh random item id.
pub fn new_item_id() -> ItemId {
    Uuid::new_v4()
}

/// Returns the current Unix time in milliseconds.
///
/// Values are strictly increasing across calls in one process: when the wall
/// clock has not advanced (or went backwards) the previous value plus one is
/// issued instead.
pub fn now_ms() -> i64 {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|elapsed| i64::try_from(elapsed.as_millis()).ok())
        .unwrap_or(0);

    let mut last = LAST_ISSUED_MS.load(Ordering::Relaxed);
    loop {
        let next = wall.max(last + 1);
        match LAST_ISSUED_MS.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed)
        {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Wraps a payload in a fresh envelope stamped with `now`.
pub fn stamp<T>(fields: T, now: i64) -> Item<T> {
    Item {
        id: new_item_id(),
        created_at: now,
        updated_at: now,
        fields,
    }
}

/// Serializes a payload (or patch) into a field map.
///
/// # Errors
/// - `NotAnObject` when `T` is not a struct/map shape.
pub fn payload_fields<T: Serialize>(payload: &T) -> Result<FieldMap, CodecError> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        _ => Err(CodecError::NotAnObject("payload")),
    }
}

/// Builds the stored document for an item.
///
/// # Errors
/// - `ReservedField` when the payload serializes an envelope key.
pub fn to_document<T: Serialize>(item: &Item<T>) -> Result<Document, CodecError> {
    let fields = payload_fields(&item.fields)?;
    if let Some(field) = ENVELOPE_FIELDS.iter().find(|key| fields.contains_key(**key)) {
        return Err(CodecError::ReservedField((*field).to_string()));
    }

    let mut document = Document::new();
    document.insert(ID_FIELD.to_string(), Value::String(item.key()));
    document.insert(CREATED_AT_FIELD.to_string(), Value::from(item.created_at));
    document.insert(UPDATED_AT_FIELD.to_string(), Value::from(item.updated_at));
    document.extend(fields);
    Ok(document)
}

/// Decodes a stored document into a typed item.
pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<Item<T>, CodecError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// Produces the field set actually sent to the store for a partial update.
///
/// `id` and `created_at` are dropped, `updated_at` is forced to `now`; the
/// caller's map is left untouched.
pub fn prepare_update(fields: &FieldMap, now: i64) -> FieldMap {
    let mut changes: FieldMap = fields
        .iter()
        .filter(|(key, _)| key.as_str() != ID_FIELD && key.as_str() != CREATED_AT_FIELD)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    changes.insert(UPDATED_AT_FIELD.to_string(), Value::from(now));
    changes
}
