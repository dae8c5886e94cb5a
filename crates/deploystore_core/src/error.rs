//! Storage error taxonomy and backing-store error translation.
//!
//! # Responsibility
//! - Define the closed set of error kinds returned by every storage operation.
//! - Classify native backend failures (SQLite, filesystem, JSON) into
//!   backing-store signals.
//! - Translate backing-store signals into storage errors.
//!
//! # Invariants
//! - `translate` is total and never panics.
//! - `NotFound` also covers "exists but not accessible"; callers must not try
//!   to tell the two apart.
//! - Unrecognized signals map to `Other` with the original message preserved.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;

pub type StorageResult<T> = Result<T, StorageError>;

pub type BackendResult<T> = Result<T, BackendError>;

const UNKNOWN_BACKEND_MESSAGE: &str = "unknown backing store error";

/// Closed error taxonomy exposed by the storage facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Entity is absent, or present but not visible to the caller.
    NotFound,
    /// Entity already exists, or a versioned write lost a race.
    AlreadyExists,
    /// Backing store is unreachable or refused our credentials.
    ConnectionFailed,
    /// Access key exists but its expiry is in the past.
    Expired,
    /// Operation is declared but has no implementation yet.
    NotImplemented,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Stable lowercase code used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::ConnectionFailed => "connection_failed",
            Self::Expired => "expired",
            Self::NotImplemented => "not_implemented",
            Self::Other => "other",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified storage failure with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    pub kind: ErrorKind,
    pub message: String,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AlreadyExists, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionFailed, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Expired, message)
    }

    /// Error for an operation whose semantics are not built yet.
    pub fn not_implemented(feature: &str) -> Self {
        Self::new(
            ErrorKind::NotImplemented,
            format!("{feature} is not implemented"),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for StorageError {}

/// Failure signal raised by a backing store adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendSignal {
    NotFound,
    Conflict,
    PermissionDenied,
    Unavailable,
    Other,
}

/// Backing-store failure before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub signal: BackendSignal,
    pub message: String,
}

impl BackendError {
    pub fn new(signal: BackendSignal, message: impl Into<String>) -> Self {
        Self {
            signal,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendSignal::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(BackendSignal::Conflict, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(BackendSignal::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendSignal::Unavailable, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendSignal::Other, message)
    }

    /// Prefixes the message with the object the failure concerns.
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.message = format!("{subject}: {}", self.message);
        self
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.signal, self.message)
    }
}

impl Error for BackendError {}

impl From<rusqlite::Error> for BackendError {
    fn from(value: rusqlite::Error) -> Self {
        let signal = match &value {
            rusqlite::Error::QueryReturnedNoRows => BackendSignal::NotFound,
            rusqlite::Error::SqliteFailure(err, _) => match err.code {
                rusqlite::ErrorCode::ConstraintViolation => BackendSignal::Conflict,
                rusqlite::ErrorCode::PermissionDenied
                | rusqlite::ErrorCode::ReadOnly
                | rusqlite::ErrorCode::AuthorizationForStatementDenied => {
                    BackendSignal::PermissionDenied
                }
                rusqlite::ErrorCode::DatabaseBusy
                | rusqlite::ErrorCode::DatabaseLocked
                | rusqlite::ErrorCode::CannotOpen
                | rusqlite::ErrorCode::SystemIoFailure
                | rusqlite::ErrorCode::FileLockingProtocolFailed => BackendSignal::Unavailable,
                _ => BackendSignal::Other,
            },
            _ => BackendSignal::Other,
        };
        Self::new(signal, value.to_string())
    }
}

impl From<io::Error> for BackendError {
    fn from(value: io::Error) -> Self {
        let signal = match value.kind() {
            io::ErrorKind::NotFound => BackendSignal::NotFound,
            io::ErrorKind::PermissionDenied => BackendSignal::PermissionDenied,
            io::ErrorKind::AlreadyExists => BackendSignal::Conflict,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut => BackendSignal::Unavailable,
            _ => BackendSignal::Other,
        };
        Self::new(signal, value.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(value: serde_json::Error) -> Self {
        Self::other(format!("invalid document: {value}"))
    }
}

impl From<DbError> for BackendError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            DbError::Migration {
                version,
                name,
                source,
            } => Self::from(source).with_subject(&format!("migration {version:04} ({name})")),
            other => Self::other(other.to_string()),
        }
    }
}

/// Maps one backing-store failure into the storage error taxonomy.
pub fn translate(error: BackendError) -> StorageError {
    let BackendError { signal, message } = error;
    match signal {
        BackendSignal::NotFound => StorageError::not_found(message),
        BackendSignal::Conflict => StorageError::already_exists(message),
        BackendSignal::PermissionDenied => {
            StorageError::connection_failed(format!("access denied: {message}"))
        }
        BackendSignal::Unavailable => StorageError::connection_failed(message),
        BackendSignal::Other => {
            if message.trim().is_empty() {
                StorageError::other(UNKNOWN_BACKEND_MESSAGE)
            } else {
                StorageError::other(message)
            }
        }
    }
}

impl From<BackendError> for StorageError {
    fn from(value: BackendError) -> Self {
        translate(value)
    }
}
