use std::fmt;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::StoreError;

/// Longest identifier accepted by [`ArtifactId::parse`].
pub const MAX_ID_LEN: usize = 64;

/// Opaque identifier naming one upload's input/output artifact pair.
///
/// Generated identifiers are random UUIDv4 values in lowercase hyphenated
/// form, so they can be embedded in a URL path without escaping. Parsed
/// identifiers are restricted to ASCII alphanumerics and `-`; anything else
/// is refused before a storage lookup can happen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(String);

impl ArtifactId {
    /// Generates a fresh identifier. 122 random bits make collisions a
    /// non-concern in practice.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Checks caller-supplied text and wraps it.
    ///
    /// ```rust
    /// use store::ArtifactId;
    ///
    /// assert!(ArtifactId::parse("0b9d3c2e-0d3f-4e7a-9d1c-5b8e2f6a7c10").is_ok());
    /// assert!(ArtifactId::parse("../etc/passwd").is_err());
    /// assert!(ArtifactId::parse("").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() || raw.len() > MAX_ID_LEN {
            return Err(StoreError::InvalidId(raw.to_string()));
        }
        if !raw.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(StoreError::InvalidId(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArtifactId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ArtifactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
