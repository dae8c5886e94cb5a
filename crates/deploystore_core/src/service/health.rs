//! Liveness check over both backing stores.
//!
//! # Invariants
//! - Every failure is reported as `ConnectionFailed` and names the failing
//!   dependency.
//! - The document store is checked before the blob store.

use crate::error::{StorageError, StorageResult};
use crate::repo::blob_store::BlobStore;
use crate::repo::entity_store::EntityStore;
use log::{info, warn};
use std::time::Instant;

/// Checks that the document store answers and the blob container exists.
pub fn check_health<E, B>(entities: &E, blobs: &B) -> StorageResult<()>
where
    E: EntityStore + ?Sized,
    B: BlobStore + ?Sized,
{
    let started_at = Instant::now();
    let result = check_backends(entities, blobs);
    let duration_ms = started_at.elapsed().as_millis();
    match &result {
        Ok(()) => info!(
            "event=health_check module=health status=ok container={} duration_ms={}",
            blobs.container_name(),
            duration_ms
        ),
        Err(err) => warn!(
            "event=health_check module=health status=error container={} duration_ms={} message={}",
            blobs.container_name(),
            duration_ms,
            err.message
        ),
    }
    result
}

fn check_backends<E, B>(entities: &E, blobs: &B) -> StorageResult<()>
where
    E: EntityStore + ?Sized,
    B: BlobStore + ?Sized,
{
    entities.ping().map_err(|err| {
        StorageError::connection_failed(format!(
            "document store health check failed: {}",
            err.message
        ))
    })?;

    match blobs.container_exists() {
        Ok(true) => Ok(()),
        Ok(false) => Err(StorageError::connection_failed(format!(
            "blob container `{}` does not exist",
            blobs.container_name()
        ))),
        Err(err) => Err(StorageError::connection_failed(format!(
            "blob store health check failed: {}",
            err.message
        ))),
    }
}
