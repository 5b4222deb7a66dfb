use crate::{check_extension, ArtifactId, ArtifactKind, ArtifactStore, StoreError, StoredArtifact};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::SystemTime;

/// Configuration for selecting and building a store.
///
/// # Example
/// ```
/// use store::StoreConfig;
///
/// // In-memory (for testing)
/// let config = StoreConfig::in_memory();
///
/// // Filesystem, laid out like the original deployment
/// let config = StoreConfig::filesystem("uploads", "processed");
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// One file per artifact. Inputs land in `input_dir`, outputs in
    /// `output_dir`; both are created on open.
    Filesystem {
        input_dir: PathBuf,
        output_dir: PathBuf,
    },
    /// A locked `HashMap`. Contents vanish with the process.
    InMemory,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::filesystem("uploads", "processed")
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        StoreConfig::InMemory
    }

    pub fn filesystem<I: Into<PathBuf>, O: Into<PathBuf>>(input_dir: I, output_dir: O) -> Self {
        StoreConfig::Filesystem {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Build the store described by this configuration.
    pub fn build(&self) -> Result<Box<dyn ArtifactStore>, StoreError> {
        match self {
            StoreConfig::InMemory => Ok(Box::new(InMemoryArtifactStore::new())),
            StoreConfig::Filesystem {
                input_dir,
                output_dir,
            } => Ok(Box::new(FsArtifactStore::open(input_dir, output_dir)?)),
        }
    }
}

/// An in-memory store using a `RwLock` around a `HashMap`.
pub struct InMemoryArtifactStore {
    records: RwLock<HashMap<(ArtifactId, ArtifactKind), StoredArtifact>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored blobs, inputs and outputs together.
    pub fn len(&self) -> usize {
        match self.records.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn put(
        &self,
        id: &ArtifactId,
        kind: ArtifactKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let extension = check_extension(extension)?;
        // The write lock covers both the existence check and the insert.
        let mut guard = self
            .records
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        let key = (id.clone(), kind);
        if guard.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                id: id.clone(),
                kind,
            });
        }
        guard.insert(
            key,
            StoredArtifact {
                bytes: Bytes::copy_from_slice(bytes),
                extension: extension.to_string(),
                written_at: SystemTime::now(),
            },
        );
        Ok(())
    }

    fn get(
        &self,
        id: &ArtifactId,
        kind: ArtifactKind,
    ) -> Result<Option<StoredArtifact>, StoreError> {
        let guard = self
            .records
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(&(id.clone(), kind)).cloned())
    }
}

/// The filesystem backend.
mod fs;

pub use fs::FsArtifactStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_put_then_get() {
        let store = InMemoryArtifactStore::new();
        let id = ArtifactId::generate();
        store.put(&id, ArtifactKind::Input, "JPG", b"jpeg-bytes").unwrap();

        let found = store.get(&id, ArtifactKind::Input).unwrap().unwrap();
        assert_eq!(found.bytes.as_ref(), b"jpeg-bytes");
        assert_eq!(found.extension, "jpg");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn in_memory_len_survives_poisoned_lock() {
        let store = std::sync::Arc::new(InMemoryArtifactStore::new());
        let id = ArtifactId::generate();
        store.put(&id, ArtifactKind::Output, "png", b"kept").unwrap();

        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.records.write().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(store.records.is_poisoned());
        assert_eq!(store.len(), 1);
        assert!(!store.is_empty());
    }

    #[test]
    fn in_memory_is_write_once() {
        let store = InMemoryArtifactStore::new();
        let id = ArtifactId::generate();
        store.put(&id, ArtifactKind::Output, "png", b"first").unwrap();

        let err = store
            .put(&id, ArtifactKind::Output, "png", b"second")
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let found = store.get(&id, ArtifactKind::Output).unwrap().unwrap();
        assert_eq!(found.bytes.as_ref(), b"first");
    }

    #[test]
    fn input_without_output_is_not_found() {
        let store = InMemoryArtifactStore::new();
        let id = ArtifactId::generate();
        store.put(&id, ArtifactKind::Input, "png", b"in").unwrap();
        assert!(store.get(&id, ArtifactKind::Output).unwrap().is_none());
    }

    #[test]
    fn config_builds_in_memory() {
        let store = StoreConfig::in_memory().build().unwrap();
        let id = ArtifactId::generate();
        assert!(store.get(&id, ArtifactKind::Output).unwrap().is_none());
        assert!(store.check_ready().is_ok());
    }

    #[test]
    fn config_deserializes_tagged() {
        let cfg: StoreConfig = serde_json::from_str(
            r#"{"backend":"filesystem","input_dir":"in","output_dir":"out"}"#,
        )
        .unwrap();
        assert_eq!(cfg, StoreConfig::filesystem("in", "out"));
    }
}
