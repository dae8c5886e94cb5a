//! Entity model for the deployment-distribution storage layer.
//!
//! # Responsibility
//! - Define the persisted shapes of accounts, apps, deployments and access keys.
//! - Define update patches used by read-merge-write updates.
//!
//! # Invariants
//! - Every entity carries a storage-assigned `id`, `createdTime` and `version`.
//! - Ownership fields (`accountId`, `appId`) are denormalized copies written in
//!   the same record as the entity they describe.
//! - Field names are persisted in camelCase.

pub mod access_key;
pub mod account;
pub mod app;
pub mod deployment;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
