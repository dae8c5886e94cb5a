//! Account model.
//!
//! # Invariants
//! - `email` identifies one account; `add_account` rejects duplicates.
//! - Fields not modelled explicitly are kept in `profile` and survive merges.
//! - A profile key never shadows a modelled or storage-owned field.

use crate::document::Document;
use serde::{Deserialize, Serialize};

/// Stored field names a profile entry may not use.
pub const RESERVED_PROFILE_KEYS: &[&str] = &[
    "id",
    "email",
    "name",
    "linkedProviders",
    "createdTime",
    "version",
    "accountId",
];

/// Returns the first profile key that collides with a reserved field.
pub fn reserved_profile_key(profile: &Document) -> Option<&str> {
    profile
        .keys()
        .map(String::as_str)
        .find(|key| RESERVED_PROFILE_KEYS.contains(key))
}

/// Registered user of the distribution service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Assigned by storage on insert.
    #[serde(default)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Identity providers the account has signed in with.
    #[serde(default)]
    pub linked_providers: Vec<String>,
    /// Unix epoch milliseconds, assigned by storage on insert.
    #[serde(default)]
    pub created_time: i64,
    /// Optimistic concurrency token, bumped on every write.
    #[serde(default)]
    pub version: u64,
    /// Arbitrary profile fields.
    #[serde(flatten)]
    pub profile: Document,
}

impl Account {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            email: email.into(),
            name: name.into(),
            linked_providers: Vec::new(),
            created_time: 0,
            version: 0,
            profile: Document::new(),
        }
    }
}

/// Partial account update merged over the stored record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_providers: Option<Vec<String>>,
    /// When set, the write fails if the stored version differs.
    #[serde(skip)]
    pub expected_version: Option<u64>,
    #[serde(flatten)]
    pub profile: Document,
}
