//! Multi-valued key/value documents handed to an index sink.

use std::collections::BTreeMap;

use serde::Serialize;

/// A document keyed by record id.
///
/// Adding a field appends to its value list, so the same key can be added
/// more than once (e.g. several `security_filter` roles).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexDocument {
    id: String,
    fields: BTreeMap<String, Vec<String>>,
}

impl IndexDocument {
    /// Creates an empty document for `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// The record id the document is sent under.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Appends a value to a field.
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(key.into()).or_default().push(value.into());
    }

    /// Appends a value only when one is given.
    pub fn add_opt(&mut self, key: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.add(key, value);
        }
    }

    /// Every value of a field, in insertion order.
    #[must_use]
    pub fn values(&self, key: &str) -> &[String] {
        self.fields.get(key).map_or(&[], Vec::as_slice)
    }

    /// The first value of a field.
    #[must_use]
    pub fn first(&self, key: &str) -> Option<&str> {
        self.values(key).first().map(String::as_str)
    }

    /// Returns `true` if the field has at least one value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        !self.values(key).is_empty()
    }

    /// All fields.
    #[must_use]
    pub const fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }
}
