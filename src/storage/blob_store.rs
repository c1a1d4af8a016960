//! Blob Store
//!
//! Writes blobs with exclusive-create semantics: a second write under an existing
//! identifier fails with [`StoreError::Collision`] and never touches the first
//! blob. All operations are blocking and are meant to run on a blocking thread.

use std::fs::{self, OpenOptions};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::types::{check_identifier, BlobRecord, DeleteOutcome, StoreError};
use crate::addressing::ContentId;

/// Filesystem blob store rooted at a single directory
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open a store, creating the root directory if needed.
    ///
    /// The root is made absolute so that paths recorded in the journal stay
    /// valid regardless of the working directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = std::path::absolute(root.as_ref())?;
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the blob for `id`.
    pub fn path_for(&self, id: &ContentId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Check the root is writable by creating and removing a throwaway file.
    pub fn ensure_writable(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root)?;

        let probe = self.root.join(format!(".probe-{}", Uuid::new_v4()));
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&probe)?;
        drop(file);

        if let Err(e) = fs::remove_file(&probe) {
            tracing::warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
        }
        Ok(())
    }

    /// Persist everything readable from `reader` under `id`.
    pub fn put<R: Read>(&self, id: &ContentId, mut reader: R) -> Result<BlobRecord, StoreError> {
        self.ensure_writable()?;

        let path = self.path_for(id);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(id = %id, "Refusing to overwrite existing blob");
                return Err(StoreError::Collision(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = io::copy(&mut reader, &mut file).and_then(|n| file.sync_all().map(|_| n));
        let size_bytes = match written {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                if let Err(cleanup) = fs::remove_file(&path) {
                    tracing::warn!(
                        path = %path.display(),
                        error = %cleanup,
                        "Failed to remove partially written blob"
                    );
                }
                return Err(e.into());
            }
        };

        tracing::debug!(id = %id, size_bytes, "Stored blob");

        Ok(BlobRecord {
            id: id.clone(),
            path,
            size_bytes,
        })
    }

    /// Read a blob by its caller-supplied identifier.
    pub fn get(&self, raw_id: &str) -> Result<Vec<u8>, StoreError> {
        check_identifier(raw_id)?;

        let path = self.root.join(raw_id);
        fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(raw_id.to_string()),
            _ => StoreError::Io(e),
        })
    }

    /// Remove the blob at `path`.
    ///
    /// Paths outside the storage root are refused. A missing file is reported
    /// as [`DeleteOutcome::AlreadyGone`].
    pub fn delete(&self, path: &Path) -> Result<DeleteOutcome, StoreError> {
        let inside_root = path.parent() == Some(self.root.as_path())
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| check_identifier(name).is_ok())
                .unwrap_or(false);
        if !inside_root {
            return Err(StoreError::Forbidden(path.display().to_string()));
        }

        match fs::remove_file(path) {
            Ok(()) => Ok(DeleteOutcome::Removed),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::AlreadyGone),
            Err(e) => Err(e.into()),
        }
    }
}
