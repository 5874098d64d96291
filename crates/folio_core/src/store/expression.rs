//! Update expressions: the store's only way to change fields in place.
//!
//! # Responsibility
//! - Build `SET` expressions where every attribute name and every value is a
//!   placeholder (`#f0`, `:v0`, ...) bound through side maps.
//! - Evaluate a received expression against a stored document.
//!
//! # Invariants
//! - The builder never interpolates a field name or value into the text.
//! - Evaluation rejects bare attribute names that are reserved words and any
//!   assignment to the partition key.
//!
//! Expression grammar understood by stores:
//! `SET <name> = <value>[, <name> = <value>]*` where `<name>` is `#token` or a
//! bare non-reserved identifier and `<value>` is `:token`.

use super::{StoreError, StoreResult};
use crate::model::item::{Document, ID_FIELD};
use serde_json::Value;
use std::collections::BTreeMap;

const SET_KEYWORD: &str = "SET ";

/// Words the store refuses as bare attribute names.
const RESERVED_WORDS: &[&str] = &[
    "add", "and", "between", "by", "count", "data", "date", "delete", "exists", "from", "in",
    "key", "name", "not", "or", "order", "remove", "set", "size", "status", "table",
    "timestamp", "type", "update", "user", "value", "where",
];

/// Returns whether `word` may not appear as a bare attribute name.
pub fn is_reserved_word(word: &str) -> bool {
    let lowered = word.to_ascii_lowercase();
    RESERVED_WORDS.contains(&lowered.as_str())
}

/// A complete update request body: expression text plus placeholder maps.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    text: String,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
}

impl UpdateExpression {
    /// Starts a placeholder-binding builder with its first assignment.
    pub fn builder(field: impl Into<String>, value: Value) -> UpdateExpressionBuilder {
        UpdateExpressionBuilder {
            clauses: Vec::new(),
            names: BTreeMap::new(),
            values: BTreeMap::new(),
        }
        .set(field, value)
    }

    /// Assembles an expression from raw parts, as received from a caller.
    ///
    /// No validation happens here; stores validate on [`UpdateExpression::apply`].
    pub fn from_parts(
        text: impl Into<String>,
        names: BTreeMap<String, String>,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            text: text.into(),
            names,
            values,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn names(&self) -> &BTreeMap<String, String> {
        &self.names
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Resolves every assignment to `(attribute, value)` pairs.
    ///
    /// # Errors
    /// - `InvalidExpression` on malformed text, unknown placeholders, reserved
    ///   bare names, or an attempt to set the partition key.
    pub fn resolve(&self) -> StoreResult<Vec<(String, Value)>> {
        let body = self.text.strip_prefix(SET_KEYWORD).ok_or_else(|| {
            StoreError::InvalidExpression(format!(
                "expression must start with `SET`: `{}`",
                self.text
            ))
        })?;

        let mut resolved = Vec::new();
        for clause in body.split(',') {
            let (name_token, value_token) = clause.split_once('=').ok_or_else(|| {
                StoreError::InvalidExpression(format!("missing `=` in `{}`", clause.trim()))
            })?;
            let attribute = self.resolve_name(name_token.trim())?;
            if attribute == ID_FIELD {
                return Err(StoreError::InvalidExpression(
                    "cannot update partition key attribute `id`".to_string(),
                ));
            }
            let value = self.resolve_value(value_token.trim())?;
            resolved.push((attribute, value));
        }

        Ok(resolved)
    }

    /// Applies the expression to `document` in place.
    pub fn apply(&self, document: &mut Document) -> StoreResult<()> {
        for (attribute, value) in self.resolve()? {
            document.insert(attribute, value);
        }
        Ok(())
    }

    fn resolve_name(&self, token: &str) -> StoreResult<String> {
        if token.starts_with('#') {
            return self.names.get(token).cloned().ok_or_else(|| {
                StoreError::InvalidExpression(format!("unbound name placeholder `{token}`"))
            });
        }
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidExpression(format!(
                "invalid attribute name `{token}`"
            )));
        }
        if is_reserved_word(token) {
            return Err(StoreError::InvalidExpression(format!(
                "attribute name is a reserved keyword: {token}"
            )));
        }
        Ok(token.to_string())
    }

    fn resolve_value(&self, token: &str) -> StoreResult<Value> {
        if !token.starts_with(':') {
            return Err(StoreError::InvalidExpression(format!(
                "value `{token}` must be a `:` placeholder"
            )));
        }
        self.values.get(token).cloned().ok_or_else(|| {
            StoreError::InvalidExpression(format!("unbound value placeholder `{token}`"))
        })
    }
}

/// Collects `SET` assignments, binding each to positional placeholders.
///
/// Holds at least one assignment.
#[derive(Debug)]
pub struct UpdateExpressionBuilder {
    clauses: Vec<String>,
    names: BTreeMap<String, String>,
    values: BTreeMap<String, Value>,
}

impl UpdateExpressionBuilder {
    /// Adds `field = value`.
    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        let position = self.clauses.len();
        let name_placeholder = format!("#f{position}");
        let value_placeholder = format!(":v{position}");
        self.clauses
            .push(format!("{name_placeholder} = {value_placeholder}"));
        self.names.insert(name_placeholder, field.into());
        self.values.insert(value_placeholder, value);
        self
    }

    pub fn build(self) -> UpdateExpression {
        UpdateExpression {
            text: format!("{SET_KEYWORD}{}", self.clauses.join(", ")),
            names: self.names,
            values: self.values,
        }
    }
}
