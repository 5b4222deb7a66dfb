//! bgrelay Ingest Layer
//!
//! This is where uploads enter the relay. We take the declared filename and
//! the raw bytes, run them through a fixed sequence of gates, and hand back a
//! decoded image that downstream stages can trust.
//!
//! ## Gates, in order (first failure wins)
//!
//! 1. **Presence** - empty bytes or empty filename are rejected.
//! 2. **Filename** - path components are stripped, the extension must be on
//!    the allow-list. No decoding happens before this passes, so a PNG named
//!    `notes.txt` never reaches the decoder.
//! 3. **Content sniff** - the bytes must decode as a supported image. The
//!    extension is never trusted.
//! 4. **Bounds** - width and height must each be at most
//!    [`IngestConfig::max_dimension`] (inclusive).
//!
//! Validation is a pure function of its inputs. The caller's bytes are only
//! read through fresh cursors, so they can be re-read afterwards.
//!
//! ## Example
//!
//! ```
//! use std::io::Cursor;
//! use image::{DynamicImage, ImageFormat, RgbImage};
//! use ingest::{validate, IngestConfig, SourceFormat, Upload};
//!
//! let mut png = Vec::new();
//! DynamicImage::ImageRgb8(RgbImage::new(8, 8))
//!     .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
//!     .unwrap();
//!
//! let validated = validate(&Upload::new("uploads/cat.png", png), &IngestConfig::default()).unwrap();
//! assert_eq!(validated.filename, "cat.png");
//! assert_eq!(validated.format, SourceFormat::Png);
//! assert_eq!((validated.width, validated.height), (8, 8));
//! ```
use std::io::Cursor;
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use tracing::{debug, warn};

mod config;
mod error;
mod filename;
mod sniff;
mod types;

pub use crate::config::{
    ConfigError, IngestConfig, DEFAULT_ALLOWED_EXTENSIONS, DEFAULT_MAX_DIMENSION,
};
pub use crate::error::IngestError;
pub use crate::filename::{extension_of, normalize_filename};
pub use crate::types::{SourceFormat, Upload, ValidatedImage};

/// Validates an upload: presence, filename, content, then bounds.
pub fn validate(upload: &Upload, cfg: &IngestConfig) -> Result<ValidatedImage, IngestError> {
    let start = Instant::now();
    match validate_inner(upload, cfg) {
        Ok(validated) => {
            debug!(
                filename = %validated.filename,
                format = %validated.format,
                width = validated.width,
                height = validated.height,
                bytes = validated.original.len(),
                elapsed_micros = start.elapsed().as_micros(),
                "validate_success"
            );
            Ok(validated)
        }
        Err(err) => {
            warn!(
                declared_filename = ?upload.filename,
                bytes = upload.bytes.len(),
                reason = err.reason_code(),
                error = %err,
                elapsed_micros = start.elapsed().as_micros(),
                "validate_failure"
            );
            Err(err)
        }
    }
}

fn validate_inner(upload: &Upload, cfg: &IngestConfig) -> Result<ValidatedImage, IngestError> {
    if upload.bytes.is_empty() {
        return Err(IngestError::EmptyUpload);
    }
    if upload.filename.is_empty() {
        return Err(IngestError::MissingFilename);
    }
    if let Some(limit) = cfg.max_payload_bytes {
        let len = upload.bytes.len();
        if len > limit {
            return Err(IngestError::PayloadTooLarge { len, limit });
        }
    }

    let filename = normalize_filename(&upload.filename)?;
    let extension = extension_of(&filename).unwrap_or_default();
    if !cfg.is_allowed_extension(&extension) {
        return Err(IngestError::UnsupportedExtension {
            extension,
            allowed: cfg.allowed_display(),
        });
    }

    // Header first: an oversized image is refused before its pixels are
    // allocated. A header that parses but a body that doesn't is still caught
    // by the full decode below.
    let format = sniff::detect_format(&upload.bytes)?;
    let (width, height) = sniff::read_dimensions(&upload.bytes, format)?;
    if width > cfg.max_dimension || height > cfg.max_dimension {
        return Err(IngestError::DimensionsTooLarge {
            width,
            height,
            max: cfg.max_dimension,
        });
    }
    let image = sniff::decode(&upload.bytes, format)?;

    Ok(ValidatedImage {
        filename,
        format,
        width,
        height,
        image,
        original: upload.bytes.clone(),
    })
}

/// Encodes an image as PNG, the format of every processed artifact.
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, IngestError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|err| IngestError::Encode(err.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn encoded(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        encoded(ImageFormat::Png, width, height)
    }

    #[test]
    fn accepts_valid_png() {
        let validated = validate(&Upload::new("a.png", png(10, 20)), &IngestConfig::default())
            .expect("valid png");
        assert_eq!(validated.format, SourceFormat::Png);
        assert_eq!(validated.width, 10);
        assert_eq!(validated.height, 20);
        assert_eq!(validated.image.width(), 10);
    }

    #[test]
    fn accepts_jpeg_with_uppercase_extension() {
        let validated = validate(
            &Upload::new("HOLIDAY.JPG", encoded(ImageFormat::Jpeg, 6, 6)),
            &IngestConfig::default(),
        )
        .expect("valid jpeg");
        assert_eq!(validated.format, SourceFormat::Jpeg);
    }

    #[test]
    fn content_wins_over_extension() {
        // A PNG named .jpg is still an allowed image; the detected format is PNG.
        let validated =
            validate(&Upload::new("mislabelled.jpg", png(3, 3)), &IngestConfig::default())
                .unwrap();
        assert_eq!(validated.format, SourceFormat::Png);
    }

    #[test]
    fn rejects_empty_bytes_first() {
        let err = validate(&Upload::new("", Vec::<u8>::new()), &IngestConfig::default()).unwrap_err();
        assert_eq!(err, IngestError::EmptyUpload);
    }

    #[test]
    fn rejects_empty_filename() {
        let err = validate(&Upload::new("", png(2, 2)), &IngestConfig::default()).unwrap_err();
        assert_eq!(err, IngestError::MissingFilename);
    }

    #[test]
    fn rejects_path_only_filename() {
        let err = validate(&Upload::new("../", png(2, 2)), &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::InvalidFilename(_)));
    }

    #[test]
    fn valid_png_named_txt_is_rejected_before_decode() {
        let err = validate(&Upload::new("image.txt", png(2, 2)), &IngestConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::UnsupportedExtension { ref extension, .. } if extension == "txt"
        ));
    }

    #[test]
    fn missing_extension_is_rejected() {
        let err = validate(&Upload::new("image", png(2, 2)), &IngestConfig::default()).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension { .. }));
    }

    #[test]
    fn text_renamed_to_png_fails_content_sniff() {
        let err = validate(
            &Upload::new("fake.png", b"just some text, not pixels".to_vec()),
            &IngestConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::NotAnImage(_)));
    }

    #[test]
    fn exact_boundary_is_accepted() {
        let cfg = IngestConfig {
            max_dimension: 64,
            ..Default::default()
        };
        assert!(validate(&Upload::new("edge.png", png(64, 64)), &cfg).is_ok());
    }

    #[test]
    fn one_pixel_over_on_either_axis_is_rejected() {
        let cfg = IngestConfig {
            max_dimension: 64,
            ..Default::default()
        };
        for (w, h) in [(65, 1), (1, 65)] {
            let err = validate(&Upload::new("big.png", png(w, h)), &cfg).unwrap_err();
            assert_eq!(
                err,
                IngestError::DimensionsTooLarge {
                    width: w,
                    height: h,
                    max: 64
                }
            );
        }
    }

    #[test]
    fn payload_limit_is_enforced() {
        let bytes = png(16, 16);
        let cfg = IngestConfig {
            max_payload_bytes: Some(bytes.len() - 1),
            ..Default::default()
        };
        let err = validate(&Upload::new("a.png", bytes), &cfg).unwrap_err();
        assert!(matches!(err, IngestError::PayloadTooLarge { .. }));
    }

    #[test]
    fn original_bytes_are_preserved() {
        let bytes = png(5, 5);
        let upload = Upload::new("a.png", bytes.clone());
        let validated = validate(&upload, &IngestConfig::default()).unwrap();
        assert_eq!(validated.original.as_ref(), bytes.as_slice());
        // The upload is still readable after validation.
        assert_eq!(upload.bytes.as_ref(), bytes.as_slice());
    }

    #[test]
    fn encode_png_keeps_alpha() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 0])));
        let bytes = encode_png(&rgba).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(0, 0)[3], 0);
    }
}
