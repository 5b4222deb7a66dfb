//! Write-once artifact storage for bgrelay.
//!
//! Every accepted upload gets a fresh [`ArtifactId`]. Under that id the relay
//! stores at most one **input** blob (the upload, verbatim) and at most one
//! **output** blob (the processed PNG). Blobs are never mutated or
//! overwritten; a second write to the same `(id, kind)` is a logic error and
//! surfaces as [`StoreError::AlreadyExists`].
//!
//! Nothing in this crate deletes artifacts. Retention is handled outside the
//! relay.
//!
//! # Backends
//!
//! - [`FsArtifactStore`]: one file per artifact, written atomically.
//! - [`InMemoryArtifactStore`]: a locked map, for tests and ephemeral runs.
//!
//! ```
//! use store::{ArtifactId, ArtifactKind, ArtifactStore, InMemoryArtifactStore};
//!
//! let store = InMemoryArtifactStore::new();
//! let id = ArtifactId::generate();
//! store.put(&id, ArtifactKind::Output, "png", b"\x89PNG...").unwrap();
//!
//! let found = store.get(&id, ArtifactKind::Output).unwrap().unwrap();
//! assert_eq!(found.bytes.as_ref(), b"\x89PNG...");
//! assert!(store.get(&id, ArtifactKind::Input).unwrap().is_none());
//! ```

use std::fmt;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod backend;
mod id;

pub use backend::{FsArtifactStore, InMemoryArtifactStore, StoreConfig};
pub use id::{ArtifactId, MAX_ID_LEN};

/// Extensions a blob may be stored under. Lookups probe these in order, so
/// the list doubles as the search order for [`ArtifactStore::get`].
pub const KNOWN_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Which half of an artifact pair a blob is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// The upload as received.
    Input,
    /// The processed image.
    Output,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Input => "input",
            ArtifactKind::Output => "output",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blob read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub bytes: Bytes,
    /// Extension the blob was written under, without the dot.
    pub extension: String,
    /// When the blob was persisted.
    pub written_at: SystemTime,
}

impl StoredArtifact {
    /// Time since the blob was written. Clock skew that puts `written_at` in
    /// the future yields zero.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.written_at)
            .unwrap_or_default()
    }
}

/// Key→blob storage for artifacts.
///
/// Implementations must be safe to share across request handlers.
pub trait ArtifactStore: Send + Sync {
    /// Stores `bytes` as the `kind` artifact of `id`, under `extension`.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if that artifact was already
    /// written (under any extension), and with
    /// [`StoreError::InvalidExtension`] for extensions outside
    /// [`KNOWN_EXTENSIONS`].
    fn put(
        &self,
        id: &ArtifactId,
        kind: ArtifactKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError>;

    /// Direct lookup of one artifact. `Ok(None)` means not found.
    fn get(&self, id: &ArtifactId, kind: ArtifactKind)
        -> Result<Option<StoredArtifact>, StoreError>;

    /// Cheap probe used by readiness checks.
    fn check_ready(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Errors surfaced by artifact stores.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The identifier contains characters outside `[A-Za-z0-9-]`, is empty,
    /// or is too long.
    #[error("invalid artifact id: {0:?}")]
    InvalidId(String),

    /// The extension is not one the store knows how to look up.
    #[error("unsupported artifact extension: {0:?}")]
    InvalidExtension(String),

    /// Write-once violation.
    #[error("{kind} artifact already exists for {id}")]
    AlreadyExists { id: ArtifactId, kind: ArtifactKind },

    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else a backend wants to report (poisoned locks, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend<E: fmt::Display>(err: E) -> Self {
        StoreError::Backend(err.to_string())
    }

    /// True for errors caused by the caller's input rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, StoreError::InvalidId(_))
    }
}

pub(crate) fn check_extension(extension: &str) -> Result<&'static str, StoreError> {
    KNOWN_EXTENSIONS
        .iter()
        .copied()
        .find(|known| known.eq_ignore_ascii_case(extension))
        .ok_or_else(|| StoreError::InvalidExtension(extension.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_extension_normalizes_case() {
        assert_eq!(check_extension("PNG").unwrap(), "png");
        assert!(matches!(
            check_extension("exe"),
            Err(StoreError::InvalidExtension(_))
        ));
        assert!(check_extension("").is_err());
        assert!(check_extension("png/../x").is_err());
    }

    #[test]
    fn age_is_never_negative() {
        let artifact = StoredArtifact {
            bytes: Bytes::new(),
            extension: "png".into(),
            written_at: SystemTime::now() + Duration::from_secs(3600),
        };
        assert_eq!(artifact.age(), Duration::ZERO);
    }

    #[test]
    fn only_invalid_id_is_client_error() {
        assert!(StoreError::InvalidId("..".into()).is_client_error());
        assert!(!StoreError::backend("boom").is_client_error());
    }

    #[test]
    fn kind_display() {
        assert_eq!(ArtifactKind::Input.to_string(), "input");
        assert_eq!(ArtifactKind::Output.to_string(), "output");
    }
}
