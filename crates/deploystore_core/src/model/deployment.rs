//! Deployment and release package model.
//!
//! # Invariants
//! - `key` is a second identifier, distinct from `id`, used by
//!   unauthenticated release clients.
//! - `app_id` and `account_id` are denormalized from the owning app.

use serde::{Deserialize, Serialize};

/// Release artifact metadata attached to a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub app_version: String,
    #[serde(default)]
    pub blob_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_disabled: bool,
    #[serde(default)]
    pub is_mandatory: bool,
    /// Sequential release label such as `v3`.
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub package_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_by: Option<String>,
    /// Percentage of clients receiving this release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollout: Option<u8>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub upload_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    #[serde(default)]
    pub id: String,
    pub name: String,
    /// Public lookup token assigned by storage.
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub account_id: String,
    /// Currently released package, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub version: u64,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            key: String::new(),
            app_id: String::new(),
            account_id: String::new(),
            package: None,
            created_time: 0,
            version: 0,
        }
    }
}

/// Partial deployment update merged over the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<Package>,
    #[serde(skip)]
    pub expected_version: Option<u64>,
}

/// Result of resolving a public deployment key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub app_id: String,
    pub deployment_id: String,
}
