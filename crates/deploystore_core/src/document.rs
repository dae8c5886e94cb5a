//! Generic document contract shared by entity store adapters.
//!
//! # Responsibility
//! - Name the entity kinds persisted by the storage layer.
//! - Describe equality filters and write preconditions for document writes.
//! - Convert typed entities to/from schemaless documents.
//! - Implement shallow merge for read-merge-write updates.
//!
//! # Invariants
//! - A document is always a JSON object keyed by camelCase field names.
//! - Merges never touch `id`, `createdTime` or `version`.

use crate::error::{BackendError, BackendResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

/// Schemaless record as stored by a document store.
pub type Document = Map<String, Value>;

/// Fields owned by the storage layer and never overwritten by a merge.
pub const PROTECTED_FIELDS: &[&str] = &["id", "createdTime", "version"];

/// Entity kinds persisted by the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Account,
    App,
    Deployment,
    AccessKey,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Account,
        EntityKind::App,
        EntityKind::Deployment,
        EntityKind::AccessKey,
    ];

    /// Stable kind name used as the first half of the composite key.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::App => "App",
            Self::Deployment => "Deployment",
            Self::AccessKey => "AccessKey",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality filter on one top-level string field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFilter {
    pub field: &'static str,
    pub value: String,
}

impl FieldFilter {
    pub fn eq(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

/// Condition a write must satisfy against the currently stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePrecondition {
    /// Upsert; last writer wins.
    #[default]
    Any,
    /// Insert only; an existing record is a conflict.
    Absent,
    /// Compare-and-swap on the stored `version`.
    Version(u64),
}

impl WritePrecondition {
    /// Precondition for an update carrying an optional expected version.
    pub fn for_update(expected_version: Option<u64>) -> Self {
        expected_version.map_or(Self::Any, Self::Version)
    }
}

/// Serializes a typed entity or patch into a document.
pub fn to_document<T: Serialize>(value: &T) -> BackendResult<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::other(format!(
            "expected a JSON object document, got `{other}`"
        ))),
    }
}

/// Deserializes a stored document into a typed entity.
pub fn from_document<T: DeserializeOwned>(document: Document) -> BackendResult<T> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// Shallow-merges `patch` over `base`, skipping storage-owned fields.
pub fn merge_documents(base: &mut Document, patch: Document) {
    for (field, value) in patch {
        if PROTECTED_FIELDS.contains(&field.as_str()) {
            continue;
        }
        base.insert(field, value);
    }
}

/// Returns the string value of one top-level field, if present.
pub fn string_field<'doc>(document: &'doc Document, field: &str) -> Option<&'doc str> {
    document.get(field).and_then(Value::as_str)
}
