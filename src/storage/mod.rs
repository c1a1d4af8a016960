//! Blob storage on the local filesystem
//!
//! One file per blob under the storage root, named by its content identifier.

mod blob_store;
mod types;

pub use blob_store::BlobStore;
pub use types::*;
