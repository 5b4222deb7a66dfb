//! Error types produced by the ingest crate.
//!
//! Every rejection the validator can produce is a variant of [`IngestError`].
//! They are all caller mistakes (bad upload), so they are safe to show to the
//! client verbatim.
//!
//! # Error Categories
//!
//! | Error | Gate | Description |
//! |-------|------|-------------|
//! | [`EmptyUpload`](IngestError::EmptyUpload) | presence | Zero-byte upload |
//! | [`MissingFilename`](IngestError::MissingFilename) | presence | Declared filename is empty |
//! | [`InvalidFilename`](IngestError::InvalidFilename) | filename | Nothing usable left after stripping path components |
//! | [`UnsupportedExtension`](IngestError::UnsupportedExtension) | filename | Extension not in the allow-list |
//! | [`NotAnImage`](IngestError::NotAnImage) | content sniff | Bytes do not decode as a supported image |
//! | [`DimensionsTooLarge`](IngestError::DimensionsTooLarge) | bounds | Width or height above the configured maximum |
//! | [`PayloadTooLarge`](IngestError::PayloadTooLarge) | bounds | Raw byte length above the configured maximum |
//! | [`Encode`](IngestError::Encode) | output | PNG encoding of a processed image failed |
//!
//! # HTTP Status Code Mapping
//!
//! ```rust
//! use ingest::IngestError;
//!
//! let err = IngestError::PayloadTooLarge { len: 20, limit: 10 };
//! assert_eq!(err.http_status_code(), 413);
//!
//! let err = IngestError::EmptyUpload;
//! assert_eq!(err.http_status_code(), 400);
//! ```
use thiserror::Error;

/// Errors that can occur while validating an uploaded image.
///
/// The enum is marked `#[non_exhaustive]`; callers matching on it should keep
/// a catch-all arm.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// The upload carried no bytes.
    #[error("uploaded file is empty")]
    EmptyUpload,

    /// The multipart part had an empty filename (browsers send this when no
    /// file was selected).
    #[error("empty filename")]
    MissingFilename,

    /// The declared filename became empty once path components, control
    /// characters, and surrounding whitespace were removed.
    ///
    /// ```rust
    /// use ingest::normalize_filename;
    ///
    /// assert!(normalize_filename("../../").is_err());
    /// ```
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),

    /// The extension is missing or not in
    /// [`IngestConfig::allowed_extensions`](crate::IngestConfig::allowed_extensions).
    ///
    /// This is checked before any decode attempt, so a valid PNG named
    /// `photo.txt` is rejected here.
    #[error("file type not allowed: {extension:?} (allowed: {allowed})")]
    UnsupportedExtension {
        /// Lowercased extension without the dot, empty when there was none.
        extension: String,
        /// Comma-separated allow-list, for the client-facing message.
        allowed: String,
    },

    /// The content does not decode as one of the supported image formats,
    /// whatever the extension claims.
    #[error("file is not a valid image: {0}")]
    NotAnImage(String),

    /// The decoded image exceeds the configured maximum on at least one axis.
    ///
    /// Images exactly at the boundary are accepted.
    #[error("image too large: {width}x{height} exceeds the maximum of {max}px per side")]
    DimensionsTooLarge {
        /// Decoded width in pixels.
        width: u32,
        /// Decoded height in pixels.
        height: u32,
        /// Configured maximum per side.
        max: u32,
    },

    /// The raw upload exceeds [`IngestConfig::max_payload_bytes`](crate::IngestConfig::max_payload_bytes).
    #[error("payload exceeds size limit: {len} bytes > {limit} bytes")]
    PayloadTooLarge {
        /// Length of the rejected upload.
        len: usize,
        /// Configured limit.
        limit: usize,
    },

    /// Encoding a processed image back to bytes failed.
    ///
    /// Unlike the other variants this is not the caller's fault.
    #[error("failed to encode image: {0}")]
    Encode(String),
}

impl IngestError {
    /// Returns true if this error indicates a client-side issue.
    ///
    /// Everything except [`Encode`](IngestError::Encode) is a rejected upload.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, IngestError::Encode(_))
    }

    /// Returns a suggested HTTP status code for this error.
    ///
    /// - `PayloadTooLarge`: 413
    /// - `Encode`: 500
    /// - All others: 400
    pub fn http_status_code(&self) -> u16 {
        match self {
            IngestError::PayloadTooLarge { .. } => 413,
            IngestError::Encode(_) => 500,
            _ => 400,
        }
    }

    /// Short machine-readable reason, used as a metrics label and in batch
    /// failure entries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            IngestError::EmptyUpload => "empty_upload",
            IngestError::MissingFilename => "missing_filename",
            IngestError::InvalidFilename(_) => "invalid_filename",
            IngestError::UnsupportedExtension { .. } => "unsupported_extension",
            IngestError::NotAnImage(_) => "not_an_image",
            IngestError::DimensionsTooLarge { .. } => "dimensions_too_large",
            IngestError::PayloadTooLarge { .. } => "payload_too_large",
            IngestError::Encode(_) => "encode_failed",
        }
    }
}
