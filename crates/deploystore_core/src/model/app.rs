//! App and collaborator model.
//!
//! # Responsibility
//! - Define the app record and its collaborator map.
//! - Provide the access predicate used by every per-app operation.
//!
//! # Invariants
//! - A new app has exactly one collaborator, the creator, with `Owner`.
//! - `is_current_account` is computed per viewer and never persisted.
//! - Access is granted to the denormalized `account_id` or any collaborator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Collaborators keyed by account id.
pub type CollaboratorMap = BTreeMap<String, CollaboratorInfo>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    Owner,
    Collaborator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaboratorInfo {
    pub account_id: String,
    pub permission: Permission,
    /// View-relative flag; true only for the requesting account.
    #[serde(skip)]
    pub is_current_account: bool,
}

impl CollaboratorInfo {
    pub fn new(account_id: impl Into<String>, permission: Permission) -> Self {
        Self {
            account_id: account_id.into(),
            permission,
            is_current_account: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Denormalized owner account id used for listing.
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub collaborators: CollaboratorMap,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub version: u64,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            account_id: String::new(),
            collaborators: CollaboratorMap::new(),
            created_time: 0,
            version: 0,
        }
    }

    /// Returns whether `account_id` may read or mutate this app.
    pub fn is_accessible_by(&self, account_id: &str) -> bool {
        self.account_id == account_id || self.collaborators.contains_key(account_id)
    }

    /// Returns the account id holding `Owner`, if any.
    pub fn owner_id(&self) -> Option<&str> {
        self.collaborators
            .values()
            .find(|info| info.permission == Permission::Owner)
            .map(|info| info.account_id.as_str())
    }

    /// Recomputes `is_current_account` for the given viewer.
    pub fn for_viewer(mut self, account_id: &str) -> Self {
        mark_current_account(&mut self.collaborators, account_id);
        self
    }
}

/// Sets `is_current_account` on exactly the viewer's entry.
pub fn mark_current_account(collaborators: &mut CollaboratorMap, account_id: &str) {
    for (collaborator_id, info) in collaborators.iter_mut() {
        info.is_current_account = collaborator_id == account_id;
    }
}

/// Partial app update merged over the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip)]
    pub expected_version: Option<u64>,
}
