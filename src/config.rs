//! Pipeline configuration.
//!
//! Everything the pipeline needs to decide whether a request is acceptable.
//! Transport concerns (bind address, body cap, timeouts) live in the server
//! crate; storage and remover selection live with their crates.
//!
//! ```
//! use bgrelay::RelayConfig;
//!
//! let cfg: RelayConfig = serde_json::from_str(r#"{
//!     "max_batch_files": 5,
//!     "rate_limits": { "remove": 10 }
//! }"#).unwrap();
//! assert_eq!(cfg.max_batch_files, 5);
//! assert_eq!(cfg.rate_limits.remove, 10);
//! assert_eq!(cfg.rate_limits.batch, 10);
//! assert_eq!(cfg.ingest.max_dimension, 3000);
//! cfg.validate().unwrap();
//! ```

use std::time::Duration;

use ingest::IngestConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rate_limit::{RateClass, RateLimits};

/// Seven days.
pub const DEFAULT_STALE_AFTER_SECS: u64 = 7 * 24 * 60 * 60;
pub const DEFAULT_MAX_BATCH_FILES: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ingest: {0}")]
    Ingest(#[from] ingest::ConfigError),
    #[error("max_batch_files must be at least 1")]
    ZeroBatchLimit,
    #[error("rate limit for {0} must be at least 1 request per window")]
    ZeroRateLimit(RateClass),
    #[error("rate limit window must be at least 1 second")]
    ZeroWindow,
    #[error("stale_after_secs must be at least 1")]
    ZeroStaleness,
}

fn default_max_batch_files() -> usize {
    DEFAULT_MAX_BATCH_FILES
}

fn default_stale_after_secs() -> u64 {
    DEFAULT_STALE_AFTER_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Validator settings: extension allow-list and dimension bound.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Upper bound on files in one batch request.
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,

    /// Downloads of artifacts older than this are logged. Nothing is deleted.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default)]
    pub rate_limits: RateLimits,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ingest: IngestConfig::default(),
            max_batch_files: default_max_batch_files(),
            stale_after_secs: default_stale_after_secs(),
            rate_limits: RateLimits::default(),
        }
    }
}

impl RelayConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingest.validate()?;
        if self.max_batch_files == 0 {
            return Err(ConfigError::ZeroBatchLimit);
        }
        if self.stale_after_secs == 0 {
            return Err(ConfigError::ZeroStaleness);
        }
        if self.rate_limits.window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        for class in [RateClass::Remove, RateClass::Batch, RateClass::Download] {
            if self.rate_limits.limit_for(class) == 0 {
                return Err(ConfigError::ZeroRateLimit(class));
            }
        }
        Ok(())
    }
}
