//! Persistence layer for a mobile-app deployment-distribution service.
//! This crate owns accounts, apps, deployments, access keys and release blobs.

pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod ids;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod signing;

pub use config::{ConfigError, Credentials, StorageConfig};
pub use document::{EntityKind, WritePrecondition};
pub use error::{translate, BackendError, BackendSignal, ErrorKind, StorageError, StorageResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::access_key::{AccessKey, AccessKeyUpdate};
pub use model::account::{Account, AccountUpdate};
pub use model::app::{App, AppUpdate, CollaboratorInfo, CollaboratorMap, Permission};
pub use model::deployment::{Deployment, DeploymentInfo, DeploymentUpdate, Package};
pub use repo::blob_store::{BlobStore, FsBlobStore};
pub use repo::entity_store::{EntityStore, SqliteEntityStore};
pub use service::storage::{LocalStorage, Storage};
pub use signing::{UrlSigner, UrlVerifyError};

/// Minimal liveness API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
