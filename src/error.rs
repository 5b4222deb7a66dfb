use std::fmt;
use std::time::Duration;

use ingest::IngestError;
use remover::RemoveError;
use store::StoreError;
use thiserror::Error;

use crate::rate_limit::RateClass;

/// Coarse classification of a [`PipelineError`].
///
/// The HTTP layer maps each kind to exactly one status code; nothing else in
/// the pipeline needs to know about transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller sent something unusable. Safe to echo back verbatim.
    Input,
    /// Upload exceeds the byte cap.
    PayloadTooLarge,
    /// No API key supplied.
    AuthRequired,
    /// API key supplied but not recognised.
    AuthInvalid,
    RateLimited,
    NotFound,
    /// The remover failed. Its description is returned to the caller.
    Processing,
    /// Storage or encoding failure. Details stay in the logs.
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Input => "input",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::AuthRequired => "auth_required",
            ErrorKind::AuthInvalid => "auth_invalid",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Processing => "processing",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can end a request inside the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Input(#[from] IngestError),
    #[error("no file provided")]
    NoFiles,
    #[error("too many files: {count} submitted, at most {max} allowed per batch")]
    BatchTooLarge { count: usize, max: usize },
    #[error("invalid file id: {0}")]
    InvalidId(String),
    #[error("API key required")]
    AuthRequired,
    #[error("invalid API key")]
    AuthInvalid,
    #[error("rate limit exceeded for {class}; retry in {}s", retry_after.as_secs().max(1))]
    RateLimited {
        class: RateClass,
        retry_after: Duration,
    },
    #[error("file not found")]
    NotFound,
    #[error("error processing image: {0}")]
    Processing(#[from] RemoveError),
    #[error("storage failure: {0}")]
    Storage(StoreError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(raw) => PipelineError::InvalidId(raw),
            other => PipelineError::Storage(other),
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Input(IngestError::PayloadTooLarge { .. }) => ErrorKind::PayloadTooLarge,
            PipelineError::Input(err) if err.is_client_error() => ErrorKind::Input,
            PipelineError::Input(_) => ErrorKind::Internal,
            PipelineError::NoFiles
            | PipelineError::BatchTooLarge { .. }
            | PipelineError::InvalidId(_) => ErrorKind::Input,
            PipelineError::AuthRequired => ErrorKind::AuthRequired,
            PipelineError::AuthInvalid => ErrorKind::AuthInvalid,
            PipelineError::RateLimited { .. } => ErrorKind::RateLimited,
            PipelineError::NotFound => ErrorKind::NotFound,
            PipelineError::Processing(_) => ErrorKind::Processing,
            PipelineError::Storage(_) | PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable, machine-readable reason, e.g. `unsupported_extension`.
    pub fn reason_code(&self) -> &'static str {
        match self {
            PipelineError::Input(err) => err.reason_code(),
            PipelineError::NoFiles => "no_file",
            PipelineError::BatchTooLarge { .. } => "batch_too_large",
            PipelineError::InvalidId(_) => "invalid_id",
            PipelineError::AuthRequired => "api_key_required",
            PipelineError::AuthInvalid => "api_key_invalid",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::NotFound => "not_found",
            PipelineError::Processing(_) => "processing_failed",
            PipelineError::Storage(_) => "storage_failure",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    /// Seconds a rate-limited caller should wait, rounded up to at least one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            PipelineError::RateLimited { retry_after, .. } => {
                let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
                Some(secs.max(1))
            }
            _ => None,
        }
    }
}
