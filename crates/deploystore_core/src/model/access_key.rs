//! Access key model.
//!
//! # Invariants
//! - `name` is the bearer token value and is unique across all keys.
//! - A key owned by one account is never shared with collaborators.
//! - A key whose `expires` is in the past must not resolve.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    #[serde(default)]
    pub id: String,
    /// Bearer token value.
    pub name: String,
    #[serde(default)]
    pub friendly_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Machine or client that requested the key.
    #[serde(default)]
    pub created_by: String,
    /// Denormalized owner account id.
    #[serde(default)]
    pub account_id: String,
    /// Unix epoch milliseconds; `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    /// Short-lived login session rather than a user-created key.
    #[serde(default)]
    pub is_session: bool,
    #[serde(default)]
    pub created_time: i64,
    #[serde(default)]
    pub version: u64,
}

impl AccessKey {
    pub fn new(name: impl Into<String>, friendly_name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            friendly_name: friendly_name.into(),
            description: None,
            created_by: String::new(),
            account_id: String::new(),
            expires: None,
            is_session: false,
            created_time: 0,
            version: 0,
        }
    }

    /// Returns whether the key has expired at `now_ms`.
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        matches!(self.expires, Some(expires) if expires < now_ms)
    }
}

/// Partial access key update merged over the stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Some(None)` clears the expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<Option<i64>>,
    #[serde(skip)]
    pub expected_version: Option<u64>,
}
