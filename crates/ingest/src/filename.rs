//! Filename normalization for uploaded parts.
//!
//! Browsers and clients send whatever they like in the multipart
//! `filename` parameter: full Windows paths, `../` sequences, control
//! characters. Only the final path component is kept, and it is only used to
//! read the extension and to echo back to the caller. It never becomes part
//! of a storage path.

use crate::error::IngestError;

/// Strips directory components, control characters, and surrounding
/// whitespace from a declared filename.
///
/// Both `/` and `\` are treated as separators regardless of platform.
/// Returns [`IngestError::InvalidFilename`] when nothing usable remains,
/// including the special names `.` and `..`.
///
/// ```rust
/// use ingest::normalize_filename;
///
/// assert_eq!(normalize_filename("C:\\Users\\me\\cat.PNG").unwrap(), "cat.PNG");
/// assert_eq!(normalize_filename("../../etc/dog.jpg").unwrap(), "dog.jpg");
/// assert!(normalize_filename("uploads/..").is_err());
/// ```
pub fn normalize_filename(declared: &str) -> Result<String, IngestError> {
    let last = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(IngestError::InvalidFilename(declared.to_string()));
    }

    Ok(cleaned.to_string())
}

/// Lowercased extension of an already-normalized filename, without the dot.
///
/// Dotfiles such as `.png` have no extension (there is no stem), matching how
/// most platforms split names.
pub fn extension_of(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
