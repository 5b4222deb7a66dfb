//! Data types flowing in and out of the validator.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

/// One uploaded file as received from the transport: the declared filename
/// and the raw bytes. Lives for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Filename exactly as the client declared it (may contain paths).
    pub filename: String,
    /// Raw body of the part.
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Image formats the validator recognizes by content.
///
/// The set mirrors the default extension allow-list; anything else the
/// decoder could sniff (TIFF, ICO, ...) is rejected as not-an-image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
    WebP,
}

impl SourceFormat {
    /// Every variant, in a stable order.
    pub const ALL: [SourceFormat; 5] = [
        SourceFormat::Png,
        SourceFormat::Jpeg,
        SourceFormat::Gif,
        SourceFormat::Bmp,
        SourceFormat::WebP,
    ];

    /// Maps a sniffed decoder format onto the supported set.
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(SourceFormat::Png),
            ImageFormat::Jpeg => Some(SourceFormat::Jpeg),
            ImageFormat::Gif => Some(SourceFormat::Gif),
            ImageFormat::Bmp => Some(SourceFormat::Bmp),
            ImageFormat::WebP => Some(SourceFormat::WebP),
            _ => None,
        }
    }

    /// The decoder format this maps to.
    pub fn image_format(self) -> ImageFormat {
        match self {
            SourceFormat::Png => ImageFormat::Png,
            SourceFormat::Jpeg => ImageFormat::Jpeg,
            SourceFormat::Gif => ImageFormat::Gif,
            SourceFormat::Bmp => ImageFormat::Bmp,
            SourceFormat::WebP => ImageFormat::WebP,
        }
    }

    /// Canonical file extension, used for the stored input artifact.
    pub fn extension(self) -> &'static str {
        match self {
            SourceFormat::Png => "png",
            SourceFormat::Jpeg => "jpg",
            SourceFormat::Gif => "gif",
            SourceFormat::Bmp => "bmp",
            SourceFormat::WebP => "webp",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            SourceFormat::Png => "image/png",
            SourceFormat::Jpeg => "image/jpeg",
            SourceFormat::Gif => "image/gif",
            SourceFormat::Bmp => "image/bmp",
            SourceFormat::WebP => "image/webp",
        }
    }

    /// Short uppercase name, as reported in the `X-Source-Format` header.
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Png => "PNG",
            SourceFormat::Jpeg => "JPEG",
            SourceFormat::Gif => "GIF",
            SourceFormat::Bmp => "BMP",
            SourceFormat::WebP => "WEBP",
        }
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// An upload that passed every gate.
///
/// The original bytes are kept alongside the decoded image so the input
/// artifact can be stored verbatim, in its source format.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    /// Filename after [`normalize_filename`](crate::normalize_filename).
    pub filename: String,
    /// Format detected from the content, not from the extension.
    pub format: SourceFormat,
    pub width: u32,
    pub height: u32,
    pub image: DynamicImage,
    /// Untouched upload bytes.
    pub original: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_format_round_trips_for_supported_set() {
        for format in SourceFormat::ALL {
            assert_eq!(
                SourceFormat::from_image_format(format.image_format()),
                Some(format)
            );
        }
    }

    #[test]
    fn unsupported_decoder_formats_are_none() {
        assert_eq!(SourceFormat::from_image_format(ImageFormat::Tiff), None);
        assert_eq!(SourceFormat::from_image_format(ImageFormat::Ico), None);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&SourceFormat::WebP).unwrap();
        assert_eq!(json, "\"webp\"");
    }
}
