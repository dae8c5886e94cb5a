//! Blob store contract and filesystem bucket implementation.
//!
//! # Responsibility
//! - Stream release artifacts into durable storage.
//! - Issue time-limited read URLs and delete objects idempotently.
//!
//! # Invariants
//! - An upload is visible only after the full stream was written and synced;
//!   a failed upload leaves neither a published object nor a partial file.
//! - Deleting an absent object succeeds.
//! - Objects live under `blobs/<blobId>` inside the bucket root.

use crate::error::{BackendError, BackendResult};
use crate::ids;
use crate::signing::UrlSigner;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BLOB_PREFIX: &str = "blobs";

static BLOB_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid blob id regex"));

/// Object store contract for release artifacts.
pub trait BlobStore: Send + Sync {
    /// Name of the root container, used in diagnostics.
    fn container_name(&self) -> &str;
    /// Streams `reader` into `blob_id` and returns the stored byte count.
    fn upload(
        &self,
        blob_id: &str,
        reader: &mut dyn Read,
        length_hint: Option<u64>,
    ) -> BackendResult<u64>;
    /// Issues a read URL valid for `ttl`.
    fn issue_read_url(&self, blob_id: &str, ttl: Duration) -> BackendResult<String>;
    /// Deletes one object; absent objects are not an error.
    fn delete(&self, blob_id: &str) -> BackendResult<()>;
    /// Returns whether the root container exists.
    fn container_exists(&self) -> BackendResult<bool>;
    /// Opens one stored object for reading.
    fn open_blob(&self, blob_id: &str) -> BackendResult<Box<dyn Read + Send>>;
}

/// Bucket directory on the local filesystem.
#[derive(Debug)]
pub struct FsBlobStore {
    bucket_name: String,
    root: PathBuf,
    base_url: String,
    signer: Option<UrlSigner>,
}

impl FsBlobStore {
    /// Opens the bucket at `root`, creating its object directory.
    ///
    /// `base_url` defaults to `file://<root>`.
    pub fn open(
        root: impl Into<PathBuf>,
        bucket_name: impl Into<String>,
        signer: Option<UrlSigner>,
        base_url: Option<String>,
    ) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(BLOB_PREFIX))?;
        let base_url = base_url.unwrap_or_else(|| format!("file://{}", root.display()));
        Ok(Self {
            bucket_name: bucket_name.into(),
            root,
            base_url,
            signer,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn blobs_dir(&self) -> PathBuf {
        self.root.join(BLOB_PREFIX)
    }

    fn object_path(&self, blob_id: &str) -> BackendResult<PathBuf> {
        validate_blob_id(blob_id)?;
        Ok(self.blobs_dir().join(blob_id))
    }
}

impl BlobStore for FsBlobStore {
    fn container_name(&self) -> &str {
        &self.bucket_name
    }

    fn upload(
        &self,
        blob_id: &str,
        reader: &mut dyn Read,
        length_hint: Option<u64>,
    ) -> BackendResult<u64> {
        let final_path = self.object_path(blob_id)?;
        let partial_path = self
            .blobs_dir()
            .join(format!(".{blob_id}.{}.partial", ids::generate()));

        let mut upload = PartialUpload::create(partial_path)?;
        let written = io::copy(reader, upload.file_mut()?)
            .map_err(|err| BackendError::other(format!("blob {blob_id} upload failed: {err}")))?;

        if let Some(expected) = length_hint {
            if written != expected {
                return Err(BackendError::other(format!(
                    "blob {blob_id} upload failed: expected {expected} bytes, received {written}"
                )));
            }
        }

        upload.commit(&final_path)?;
        Ok(written)
    }

    fn issue_read_url(&self, blob_id: &str, ttl: Duration) -> BackendResult<String> {
        validate_blob_id(blob_id)?;
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| BackendError::permission_denied("no signing credentials configured"))?;
        let expires_at = now_epoch_secs().saturating_add(ttl.as_secs());
        Ok(signer.sign_url(
            &self.base_url,
            &format!("{BLOB_PREFIX}/{blob_id}"),
            expires_at,
        ))
    }

    fn delete(&self, blob_id: &str) -> BackendResult<()> {
        let path = self.object_path(blob_id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn container_exists(&self) -> BackendResult<bool> {
        match fs::metadata(&self.root) {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn open_blob(&self, blob_id: &str) -> BackendResult<Box<dyn Read + Send>> {
        let path = self.object_path(blob_id)?;
        let file = File::open(path)
            .map_err(|err| BackendError::from(err).with_subject(&format!("blob {blob_id}")))?;
        Ok(Box::new(file))
    }
}

/// Temporary upload file removed on drop unless committed.
struct PartialUpload {
    path: PathBuf,
    file: Option<File>,
    committed: bool,
}

impl PartialUpload {
    fn create(path: PathBuf) -> BackendResult<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            committed: false,
        })
    }

    fn file_mut(&mut self) -> BackendResult<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| BackendError::other("upload file already closed"))
    }

    fn commit(mut self, destination: &Path) -> BackendResult<()> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| BackendError::other("upload file already closed"))?;
        file.flush()?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.path, destination)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartialUpload {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn validate_blob_id(blob_id: &str) -> BackendResult<()> {
    if blob_id == "." || blob_id == ".." || !BLOB_ID_RE.is_match(blob_id) {
        return Err(BackendError::other(format!("invalid blob id `{blob_id}`")));
    }
    Ok(())
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
