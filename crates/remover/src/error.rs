use std::io;
use thiserror::Error;

/// Errors surfaced by background removers.
///
/// The relay treats all of these as a single "processing failed" class; the
/// variants exist so logs say which part of the adapter broke.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoveError {
    /// The ONNX model could not be located.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// Configuration is inconsistent or names a backend that isn't compiled in.
    #[error("invalid remover config: {0}")]
    InvalidConfig(String),
    /// The external command could not be run or exited unsuccessfully.
    #[error("remover command failed: {0}")]
    Command(String),
    /// The image can't be handled (zero-sized, mask mismatch, ...).
    #[error("unsupported image: {0}")]
    UnsupportedImage(String),
    /// Encoding the input or decoding the result failed.
    #[error("image codec error: {0}")]
    Codec(String),
    /// Low-level IO failures (pipes, model file).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// ONNX Runtime failures.
    #[error("inference failure: {0}")]
    Inference(String),
}

impl From<image::ImageError> for RemoveError {
    fn from(err: image::ImageError) -> Self {
        RemoveError::Codec(err.to_string())
    }
}
