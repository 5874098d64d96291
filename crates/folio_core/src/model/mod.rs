//! Data model shared by the engine and the record-kind façades.
//!
//! # Responsibility
//! - Define the item envelope and the schemaless document form.
//! - Define the payload of every record kind.
//! - Keep envelope stamping and document shaping free of I/O.

pub mod codec;
pub mod item;
pub mod records;
