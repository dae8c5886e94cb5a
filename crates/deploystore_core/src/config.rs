//! Storage configuration loading.
//!
//! # Responsibility
//! - Describe where the document database and blob bucket live.
//! - Load project, bucket and credential settings from the environment.
//!
//! # Invariants
//! - Missing or invalid required settings fail at startup, never per call.
//! - Inline credentials take precedence over a credentials file.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PROJECT_ID: &str = "DEPLOYSTORE_PROJECT_ID";
pub const ENV_PROJECT_ID_FALLBACK: &str = "GOOGLE_CLOUD_PROJECT";
pub const ENV_BUCKET_NAME: &str = "DEPLOYSTORE_BUCKET_NAME";
pub const ENV_BUCKET_NAME_FALLBACK: &str = "GCS_BUCKET_NAME";
pub const ENV_DATA_DIR: &str = "DEPLOYSTORE_DATA_DIR";
pub const ENV_CREDENTIALS: &str = "DEPLOYSTORE_CREDENTIALS";
pub const ENV_CREDENTIALS_FILE: &str = "DEPLOYSTORE_CREDENTIALS_FILE";
pub const ENV_BLOB_URL_TTL_SECS: &str = "DEPLOYSTORE_BLOB_URL_TTL_SECS";
pub const ENV_PUBLIC_BASE_URL: &str = "DEPLOYSTORE_PUBLIC_BASE_URL";

/// Default lifetime of issued blob read URLs.
pub const DEFAULT_BLOB_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// Configuration loading errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVariable(&'static str),
    InvalidValue { name: &'static str, reason: String },
    Credentials(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingVariable(name) => write!(f, "missing required setting `{name}`"),
            Self::InvalidValue { name, reason } => {
                write!(f, "invalid value for `{name}`: {reason}")
            }
            Self::Credentials(message) => write!(f, "invalid credentials: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// Service account credentials; `private_key` signs blob read URLs.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub client_email: String,
    pub private_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Parses credentials from a JSON document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let credentials: Self =
            serde_json::from_str(text).map_err(|err| ConfigError::Credentials(err.to_string()))?;
        if credentials.private_key.trim().is_empty() {
            return Err(ConfigError::Credentials(
                "private_key must not be empty".to_string(),
            ));
        }
        Ok(credentials)
    }

    /// Reads and parses a JSON credentials file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            ConfigError::Credentials(format!("cannot read `{}`: {err}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

/// Settings needed to construct the storage facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub project_id: String,
    pub bucket_name: String,
    /// Root directory holding the database and bucket directories.
    pub data_dir: PathBuf,
    pub credentials: Option<Credentials>,
    pub blob_url_ttl: Duration,
    /// Prefix for issued blob URLs; defaults to the bucket's `file://` root.
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    pub fn new(
        project_id: impl Into<String>,
        bucket_name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            bucket_name: bucket_name.into(),
            data_dir: data_dir.into(),
            credentials: None,
            blob_url_ttl: DEFAULT_BLOB_URL_TTL,
            public_base_url: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Loads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let project_id = read(ENV_PROJECT_ID)
            .or_else(|| read(ENV_PROJECT_ID_FALLBACK))
            .ok_or(ConfigError::MissingVariable(ENV_PROJECT_ID))?;
        let bucket_name = read(ENV_BUCKET_NAME)
            .or_else(|| read(ENV_BUCKET_NAME_FALLBACK))
            .ok_or(ConfigError::MissingVariable(ENV_BUCKET_NAME))?;
        let data_dir = read(ENV_DATA_DIR).ok_or(ConfigError::MissingVariable(ENV_DATA_DIR))?;

        let credentials = match (read(ENV_CREDENTIALS), read(ENV_CREDENTIALS_FILE)) {
            (Some(inline), _) => Some(Credentials::from_json(&inline)?),
            (None, Some(path)) => Some(Credentials::from_file(Path::new(&path))?),
            (None, None) => None,
        };

        let blob_url_ttl = match read(ENV_BLOB_URL_TTL_SECS) {
            Some(value) => parse_ttl(&value)?,
            None => DEFAULT_BLOB_URL_TTL,
        };

        let config = Self {
            project_id,
            bucket_name,
            data_dir: PathBuf::from(data_dir),
            credentials,
            blob_url_ttl,
            public_base_url: read(ENV_PUBLIC_BASE_URL),
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks identifier shapes and durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_identifier(ENV_PROJECT_ID, &self.project_id)?;
        validate_identifier(ENV_BUCKET_NAME, &self.bucket_name)?;
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingVariable(ENV_DATA_DIR));
        }
        if self.blob_url_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: ENV_BLOB_URL_TTL_SECS,
                reason: "ttl must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the SQLite document database.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", self.project_id))
    }

    /// Root directory of the blob bucket.
    pub fn bucket_root(&self) -> PathBuf {
        self.data_dir.join("buckets").join(&self.bucket_name)
    }
}

fn parse_ttl(value: &str) -> Result<Duration, ConfigError> {
    let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
        name: ENV_BLOB_URL_TTL_SECS,
        reason: format!("`{value}` is not a whole number of seconds"),
    })?;
    Ok(Duration::from_secs(secs))
}

fn validate_identifier(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let valid = !value.is_empty()
        && value != "."
        && value != ".."
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            name,
            reason: format!("`{value}` must match [A-Za-z0-9._-]+"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, Credentials, StorageConfig, DEFAULT_BLOB_URL_TTL, ENV_BUCKET_NAME,
        ENV_DATA_DIR,
    };
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn loads_required_settings_with_defaults() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_BUCKET_NAME", "artifacts"),
            ("DEPLOYSTORE_DATA_DIR", "/var/lib/deploystore"),
        ]))
        .expect("config should load");

        assert_eq!(config.project_id, "releases");
        assert_eq!(config.blob_url_ttl, DEFAULT_BLOB_URL_TTL);
        assert!(config.credentials.is_none());
        assert!(config.database_path().ends_with("releases.sqlite3"));
        assert!(config.bucket_root().ends_with("buckets/artifacts"));
    }

    #[test]
    fn falls_back_to_cloud_variable_names() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("GOOGLE_CLOUD_PROJECT", "legacy"),
            ("GCS_BUCKET_NAME", "legacy-bucket"),
            ("DEPLOYSTORE_DATA_DIR", "/tmp/x"),
        ]))
        .expect("fallback names should load");
        assert_eq!(config.project_id, "legacy");
        assert_eq!(config.bucket_name, "legacy-bucket");
    }

    #[test]
    fn missing_required_setting_is_reported_by_name() {
        let err = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_DATA_DIR", "/tmp/x"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingVariable(ENV_BUCKET_NAME));

        let err = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_BUCKET_NAME", "artifacts"),
            ("DEPLOYSTORE_DATA_DIR", "   "),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingVariable(ENV_DATA_DIR));
    }

    #[test]
    fn rejects_path_like_bucket_names_and_bad_ttl() {
        let err = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_BUCKET_NAME", "../escape"),
            ("DEPLOYSTORE_DATA_DIR", "/tmp/x"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_BUCKET_NAME", "artifacts"),
            ("DEPLOYSTORE_DATA_DIR", "/tmp/x"),
            ("DEPLOYSTORE_BLOB_URL_TTL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn inline_credentials_win_over_file_and_are_redacted_in_debug() {
        let config = StorageConfig::from_lookup(lookup(&[
            ("DEPLOYSTORE_PROJECT_ID", "releases"),
            ("DEPLOYSTORE_BUCKET_NAME", "artifacts"),
            ("DEPLOYSTORE_DATA_DIR", "/tmp/x"),
            ("DEPLOYSTORE_BLOB_URL_TTL_SECS", "120"),
            (
                "DEPLOYSTORE_CREDENTIALS",
                r#"{"client_email":"svc@example.com","private_key":"secret"}"#,
            ),
            ("DEPLOYSTORE_CREDENTIALS_FILE", "/does/not/exist.json"),
        ]))
        .expect("inline credentials should load");

        let credentials = config.credentials.expect("credentials should be present");
        assert_eq!(credentials.client_email, "svc@example.com");
        assert!(!format!("{credentials:?}").contains("secret"));
        assert_eq!(config.blob_url_ttl, Duration::from_secs(120));
    }

    #[test]
    fn credentials_file_is_read_and_validated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, r#"{"client_email":"svc@example.com","private_key":""}"#).unwrap();
        let err = Credentials::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Credentials(_)));

        let missing = Credentials::from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(missing.to_string().contains("cannot read"));
    }
}
