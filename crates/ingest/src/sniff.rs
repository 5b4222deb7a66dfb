//! Content sniffing: decide what an upload actually is from its bytes.
//!
//! All readers here wrap the caller's slice in a fresh `Cursor`, so the
//! upload itself is never consumed and can be re-read by later stages.

use std::io::Cursor;

use image::{DynamicImage, ImageReader};

use crate::error::IngestError;
use crate::types::SourceFormat;

/// Detects the format from magic bytes and maps it onto the supported set.
pub(crate) fn detect_format(bytes: &[u8]) -> Result<SourceFormat, IngestError> {
    let format = image::guess_format(bytes)
        .map_err(|err| IngestError::NotAnImage(err.to_string()))?;
    SourceFormat::from_image_format(format).ok_or_else(|| {
        IngestError::NotAnImage(format!("unsupported image format {format:?}"))
    })
}

/// Reads width and height from the header only.
pub(crate) fn read_dimensions(
    bytes: &[u8],
    format: SourceFormat,
) -> Result<(u32, u32), IngestError> {
    ImageReader::with_format(Cursor::new(bytes), format.image_format())
        .into_dimensions()
        .map_err(|err| IngestError::NotAnImage(err.to_string()))
}

/// Fully decodes the image.
pub(crate) fn decode(bytes: &[u8], format: SourceFormat) -> Result<DynamicImage, IngestError> {
    ImageReader::with_format(Cursor::new(bytes), format.image_format())
        .decode()
        .map_err(|err| IngestError::NotAnImage(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn encoded(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([9, 8, 7])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn detects_png_and_jpeg_by_content() {
        assert_eq!(detect_format(&encoded(ImageFormat::Png, 4, 4)).unwrap(), SourceFormat::Png);
        assert_eq!(detect_format(&encoded(ImageFormat::Jpeg, 4, 4)).unwrap(), SourceFormat::Jpeg);
    }

    #[test]
    fn text_is_not_an_image() {
        let err = detect_format(b"hello, I am definitely a picture").unwrap_err();
        assert!(matches!(err, IngestError::NotAnImage(_)));
    }

    #[test]
    fn tiff_magic_is_rejected() {
        let err = detect_format(b"II*\0\x08\0\0\0rest").unwrap_err();
        assert!(matches!(err, IngestError::NotAnImage(_)));
    }

    #[test]
    fn dimensions_come_from_header() {
        let bytes = encoded(ImageFormat::Png, 17, 5);
        assert_eq!(read_dimensions(&bytes, SourceFormat::Png).unwrap(), (17, 5));
    }

    #[test]
    fn truncated_body_fails_to_decode() {
        let mut bytes = encoded(ImageFormat::Png, 32, 32);
        bytes.truncate(bytes.len() / 2);
        assert!(matches!(
            decode(&bytes, SourceFormat::Png),
            Err(IngestError::NotAnImage(_))
        ));
    }
}
