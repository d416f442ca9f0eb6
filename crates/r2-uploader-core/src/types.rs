// SPDX-License-Identifier: AGPL-3.0
// R2 Uploader Core - Type definitions

use serde::{Deserialize, Serialize};

/// Kind of object storage a bucket lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BucketKind {
    #[default]
    R2,
    S3,
}

impl BucketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R2 => "r2",
            Self::S3 => "s3",
        }
    }
}

impl std::str::FromStr for BucketKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "r2" => Ok(Self::R2),
            "s3" => Ok(Self::S3),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown bucket type: {}",
                other
            ))),
        }
    }
}

/// Credential and endpoint bundle for one remote bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketConfig {
    /// Assigned by the bucket store on insert
    #[serde(default)]
    pub id: u32,
    #[serde(rename = "type", default)]
    pub kind: BucketKind,
    pub bucket_name: String,
    pub account_id: String,
    pub access_key: String,
    pub secret_key: String,
    /// Public domain objects are served from, e.g. `https://files.example.com`
    #[serde(default)]
    pub custom_domain: String,
    /// Explicit S3 API endpoint (S3-compatible stores only)
    #[serde(default)]
    pub s3_api: Option<String>,
}

impl BucketConfig {
    /// Check that every credential field needed to reach the bucket is filled in
    pub fn validate(&self) -> Result<(), AppError> {
        let required = [
            ("bucket name", &self.bucket_name),
            ("account id", &self.account_id),
            ("access key", &self.access_key),
            ("secret key", &self.secret_key),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(AppError::InvalidConfig(format!(
                    "Bucket {} must not be empty",
                    field
                )));
            }
        }

        if self.kind == BucketKind::S3 && self.s3_api.as_deref().unwrap_or("").is_empty() {
            return Err(AppError::InvalidConfig(
                "S3 buckets need an API endpoint".to_string(),
            ));
        }

        Ok(())
    }

    /// Public URL for an object key, or the key itself when no domain is set
    pub fn public_url(&self, object_key: &str) -> String {
        let domain = self.custom_domain.trim().trim_end_matches('/');
        if domain.is_empty() {
            object_key.to_string()
        } else {
            format!("{}/{}", domain, object_key)
        }
    }
}

/// Application settings (single row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub sidebar_collapsed: bool,
    /// Route transfers through the system proxy when one is configured
    #[serde(default = "default_use_system_proxy")]
    pub use_system_proxy: bool,
    /// UI locale, e.g. "en" or "zh"
    #[serde(default = "default_locale")]
    pub locale: String,
    /// Bucket selected on startup
    #[serde(default)]
    pub default_bucket_id: Option<u32>,
}

fn default_use_system_proxy() -> bool {
    true
}

fn default_locale() -> String {
    "en".to_string()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            sidebar_collapsed: false,
            use_system_proxy: default_use_system_proxy(),
            locale: default_locale(),
            default_bucket_id: None,
        }
    }
}

/// Error types for the application
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No bucket configured, add or select a bucket before uploading")]
    NoBucketConfigured,

    #[error("Item already staged: {0}")]
    DuplicateItem(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Illegal transition for {id}: {event} while {from}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        event: &'static str,
    },

    #[error("History already holds an entry for {0}")]
    DuplicateHistoryEntry(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Transfer executor error: {0}")]
    Executor(String),

    #[error("Preview unavailable: {0}")]
    Preview(String),

    #[error("Engine stopped")]
    EngineStopped,
}

impl AppError {
    /// Errors that point at a coordination bug rather than bad input
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::DuplicateItem(_) | Self::InvalidTransition { .. } | Self::DuplicateHistoryEntry(_)
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::FileIo(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}
