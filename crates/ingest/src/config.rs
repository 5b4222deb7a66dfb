//! Configuration types for upload validation.
//!
//! [`IngestConfig`] controls which uploads the validator accepts: the
//! extension allow-list, the per-axis dimension ceiling, and an optional raw
//! byte ceiling. It is cheap to clone and deserializes from any format the
//! server's config layer understands.
//!
//! # Quick Start
//!
//! ```rust
//! use ingest::IngestConfig;
//!
//! let config = IngestConfig::default();
//! config.validate().expect("default config is valid");
//! assert_eq!(config.max_dimension, 3000);
//! ```
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Extensions accepted when nothing else is configured.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Default per-axis pixel ceiling.
pub const DEFAULT_MAX_DIMENSION: u32 = 3000;

/// Runtime configuration for the upload validator.
///
/// # Serialization
///
/// ```json
/// {
///   "allowed_extensions": ["jpg", "jpeg", "png", "gif", "bmp", "webp"],
///   "max_dimension": 3000,
///   "max_payload_bytes": 16777216
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Lowercase extensions (without the dot) that may be uploaded.
    ///
    /// Entries are compared case-insensitively and a leading dot is ignored,
    /// so `".PNG"` in a config file behaves like `"png"`.
    ///
    /// Default: [`DEFAULT_ALLOWED_EXTENSIONS`]
    pub allowed_extensions: Vec<String>,

    /// Maximum width and maximum height in pixels. Checked per axis and
    /// inclusive: a `3000x3000` image passes the default.
    ///
    /// Default: [`DEFAULT_MAX_DIMENSION`]
    pub max_dimension: u32,

    /// Maximum raw upload length in bytes.
    ///
    /// The HTTP layer already caps request bodies, so this is mostly useful to
    /// library callers that feed bytes from elsewhere.
    ///
    /// Default: `None` (unlimited)
    pub max_payload_bytes: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            max_payload_bytes: None,
        }
    }
}

impl IngestConfig {
    /// Returns true if `extension` (without the dot) is on the allow-list.
    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        if extension.is_empty() {
            return false;
        }
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    /// The allow-list rendered for error messages, e.g. `".jpg, .png"`.
    pub fn allowed_display(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Validates internal consistency of this configuration.
    ///
    /// Call once at start-up; every check is in-memory.
    ///
    /// ```rust
    /// use ingest::{ConfigError, IngestConfig};
    ///
    /// let config = IngestConfig {
    ///     max_dimension: 0,
    ///     ..Default::default()
    /// };
    /// assert_eq!(config.validate(), Err(ConfigError::ZeroMaxDimension));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::EmptyAllowList);
        }
        if let Some(bad) = self
            .allowed_extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').is_empty())
        {
            return Err(ConfigError::InvalidExtension(bad.clone()));
        }
        if self.max_dimension == 0 {
            return Err(ConfigError::ZeroMaxDimension);
        }
        if self.max_payload_bytes == Some(0) {
            return Err(ConfigError::ZeroPayloadLimit);
        }
        Ok(())
    }
}

/// Errors that can occur when validating an [`IngestConfig`].
///
/// These are start-up problems; the server refuses to bind with any of them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No extension would ever be accepted.
    #[error("allowed_extensions must not be empty")]
    EmptyAllowList,

    /// An entry in the allow-list is blank.
    #[error("allowed_extensions contains an empty entry: {0:?}")]
    InvalidExtension(String),

    /// Every image would be rejected as oversized.
    #[error("max_dimension must be greater than zero")]
    ZeroMaxDimension,

    /// Every upload would be rejected as too large.
    #[error("max_payload_bytes must be greater than zero when set")]
    ZeroPayloadLimit,
}
