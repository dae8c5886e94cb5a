//! Time-limited signed read URLs for blob objects.
//!
//! # Responsibility
//! - Issue read URLs that embed an expiry and an HMAC-SHA256 signature.
//! - Verify presented URLs before serving a download.
//!
//! # Invariants
//! - A signature binds the bucket, the object path and the expiry together.
//! - Verification rejects expired URLs before comparing signatures.

use crate::config::{ConfigError, Credentials};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::error::Error;
use std::fmt::{Display, Formatter};

type HmacSha256 = Hmac<Sha256>;

/// URL verification failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlVerifyError {
    Malformed(String),
    Expired { expires_at: u64 },
    BadSignature,
}

impl Display for UrlVerifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(reason) => write!(f, "malformed signed url: {reason}"),
            Self::Expired { expires_at } => write!(f, "signed url expired at {expires_at}"),
            Self::BadSignature => write!(f, "signed url signature mismatch"),
        }
    }
}

impl Error for UrlVerifyError {}

/// Signs and verifies read URLs for one bucket.
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
    bucket: String,
}

impl UrlSigner {
    /// Keys the signer with the credentials' private key.
    pub fn new(credentials: &Credentials, bucket: impl Into<String>) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(credentials.private_key.as_bytes())
            .map_err(|err| ConfigError::Credentials(format!("unusable signing key: {err}")))?;
        Ok(Self {
            mac,
            bucket: bucket.into(),
        })
    }

    /// Hex HMAC over bucket, object path and expiry.
    pub fn signature(&self, object: &str, expires_at: u64) -> String {
        hex::encode(self.keyed(object, expires_at).finalize().into_bytes())
    }

    fn keyed(&self, object: &str, expires_at: u64) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(self.bucket.as_bytes());
        mac.update(b"\n");
        mac.update(object.as_bytes());
        mac.update(b"\n");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    /// Builds `<base>/<object>?expires=<secs>&signature=<hex>`.
    pub fn sign_url(&self, base_url: &str, object: &str, expires_at: u64) -> String {
        format!(
            "{}/{}?expires={}&signature={}",
            base_url.trim_end_matches('/'),
            object,
            expires_at,
            self.signature(object, expires_at)
        )
    }

    /// Verifies a URL issued under `base_url` and returns its object path.
    pub fn verify_url(
        &self,
        base_url: &str,
        url: &str,
        now_secs: u64,
    ) -> Result<String, UrlVerifyError> {
        let prefix = format!("{}/", base_url.trim_end_matches('/'));
        let rest = url
            .strip_prefix(prefix.as_str())
            .ok_or_else(|| UrlVerifyError::Malformed("unexpected base url".to_string()))?;
        let (object, query) = rest
            .split_once('?')
            .ok_or_else(|| UrlVerifyError::Malformed("missing query string".to_string()))?;

        let mut expires_at = None;
        let mut signature = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("expires", value)) => expires_at = value.parse::<u64>().ok(),
                Some(("signature", value)) => signature = Some(value),
                _ => {}
            }
        }
        let expires_at = expires_at
            .ok_or_else(|| UrlVerifyError::Malformed("missing or invalid expires".to_string()))?;
        let signature =
            signature.ok_or_else(|| UrlVerifyError::Malformed("missing signature".to_string()))?;

        if expires_at < now_secs {
            return Err(UrlVerifyError::Expired { expires_at });
        }
        let presented = hex::decode(signature).map_err(|_| UrlVerifyError::BadSignature)?;
        self.keyed(object, expires_at)
            .verify_slice(&presented)
            .map_err(|_| UrlVerifyError::BadSignature)?;
        Ok(object.to_string())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}
