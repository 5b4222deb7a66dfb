use crate::{
    check_extension, ArtifactId, ArtifactKind, ArtifactStore, StoreError, StoredArtifact,
    KNOWN_EXTENSIONS,
};
use bytes::Bytes;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Stores each artifact as `<dir>/<id>_<kind>.<ext>`.
///
/// Writes go to a temporary file in the destination directory and are then
/// linked into place without clobbering, so a reader either sees the whole
/// blob or nothing, and an existing artifact is never replaced.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl FsArtifactStore {
    /// Opens (and creates, if needed) both directories.
    pub fn open<I: AsRef<Path>, O: AsRef<Path>>(
        input_dir: I,
        output_dir: O,
    ) -> Result<Self, StoreError> {
        let input_dir = input_dir.as_ref().to_path_buf();
        let output_dir = output_dir.as_ref().to_path_buf();
        fs::create_dir_all(&input_dir)?;
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            input_dir,
            output_dir,
        })
    }

    fn dir_for(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Input => &self.input_dir,
            ArtifactKind::Output => &self.output_dir,
        }
    }

    /// Path an artifact lives at. `id` has already been restricted to
    /// `[A-Za-z0-9-]` and `extension` to [`KNOWN_EXTENSIONS`], so the result
    /// always stays inside the kind's directory.
    pub fn path_for(&self, id: &ArtifactId, kind: ArtifactKind, extension: &str) -> PathBuf {
        self.dir_for(kind)
            .join(format!("{}_{}.{}", id.as_str(), kind.as_str(), extension))
    }

    fn find_existing(&self, id: &ArtifactId, kind: ArtifactKind) -> Option<(PathBuf, &'static str)> {
        KNOWN_EXTENSIONS
            .iter()
            .map(|ext| (self.path_for(id, kind, ext), *ext))
            .find(|(path, _)| path.is_file())
    }
}

impl ArtifactStore for FsArtifactStore {
    fn put(
        &self,
        id: &ArtifactId,
        kind: ArtifactKind,
        extension: &str,
        bytes: &[u8],
    ) -> Result<(), StoreError> {
        let extension = check_extension(extension)?;
        if self.find_existing(id, kind).is_some() {
            return Err(StoreError::AlreadyExists {
                id: id.clone(),
                kind,
            });
        }

        let target = self.path_for(id, kind, extension);
        let mut tmp = NamedTempFile::new_in(self.dir_for(kind))?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&target).map_err(|err| {
            if err.error.kind() == io::ErrorKind::AlreadyExists {
                StoreError::AlreadyExists {
                    id: id.clone(),
                    kind,
                }
            } else {
                StoreError::Io(err.error)
            }
        })?;

        debug!(path = %target.display(), bytes = bytes.len(), "artifact_written");
        Ok(())
    }

    fn get(
        &self,
        id: &ArtifactId,
        kind: ArtifactKind,
    ) -> Result<Option<StoredArtifact>, StoreError> {
        let Some((path, extension)) = self.find_existing(id, kind) else {
            return Ok(None);
        };

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let written_at = fs::metadata(&path)?.modified()?;

        Ok(Some(StoredArtifact {
            bytes: Bytes::from(data),
            extension: extension.to_string(),
            written_at,
        }))
    }

    fn check_ready(&self) -> Result<(), StoreError> {
        // Creating (and dropping) a temp file proves the directory is writable.
        NamedTempFile::new_in(&self.input_dir)?;
        NamedTempFile::new_in(&self.output_dir)?;
        Ok(())
    }
}
