//! Storage types

use std::path::PathBuf;

use serde::Serialize;

use crate::addressing::ContentId;

/// A blob persisted under its content identifier
#[derive(Debug, Clone, Serialize)]
pub struct BlobRecord {
    pub id: ContentId,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The file existed and was removed
    Removed,
    /// Nothing to remove; the file was already gone
    AlreadyGone,
}

/// Storage-specific errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Identifier already exists: {0}")]
    Collision(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Forbidden identifier or path: {0}")]
    Forbidden(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reject identifiers that could escape the storage root.
///
/// Empty identifiers and `.` name no blob and are treated as missing rather
/// than forbidden.
pub fn check_identifier(raw: &str) -> Result<(), StoreError> {
    if raw.is_empty() || raw == "." {
        return Err(StoreError::NotFound(raw.to_string()));
    }
    if raw.contains("..") || raw.contains('/') || raw.contains('\\') || raw.contains('\0') {
        return Err(StoreError::Forbidden(raw.to_string()));
    }
    Ok(())
}
