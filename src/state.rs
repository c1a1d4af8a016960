//! Application state management

use std::sync::Arc;

use crate::addressing::ContentAddresser;
use crate::config::Config;
use crate::journal::{Journal, JournalError};
use crate::reconciler::Reconciler;
use crate::storage::{BlobStore, StoreError};
use crate::upload::UploadCoordinator;

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to initialize blob storage: {0}")]
    Storage(#[from] StoreError),

    #[error("Failed to initialize TTL journal: {0}")]
    Journal(#[from] JournalError),
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: BlobStore,
    journal: Arc<Journal>,
    coordinator: UploadCoordinator,
}

impl AppState {
    /// Create a new application state
    ///
    /// Creates the storage and journal directories and checks the storage root
    /// is writable.
    pub fn new(config: Config) -> Result<Self, StateError> {
        let store = BlobStore::open(&config.storage.root)?;
        store.ensure_writable()?;

        let journal = Arc::new(Journal::open(
            &config.journal.dir,
            &config.journal.file_name,
        )?);

        let coordinator = UploadCoordinator::new(
            ContentAddresser::new(config.hashing.key.clone()),
            store.clone(),
            journal.clone(),
            config.retention.default_ttl,
            config.storage.max_upload_bytes,
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                journal,
                coordinator,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the blob store
    pub fn store(&self) -> &BlobStore {
        &self.inner.store
    }

    /// Get the TTL journal
    pub fn journal(&self) -> &Arc<Journal> {
        &self.inner.journal
    }

    /// Get the upload coordinator
    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.inner.coordinator
    }

    /// Build a reconciler sharing this state's journal and store
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.inner.journal.clone(),
            self.inner.store.clone(),
            self.inner.config.retention.reconcile_interval,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::rooted_at(temp_dir.path());

        let state = AppState::new(config).unwrap();

        assert!(temp_dir.path().join("uploads").is_dir());
        assert!(temp_dir.path().join("log").is_dir());
        assert_eq!(
            state.journal().path(),
            temp_dir.path().join("log").join("entries.log")
        );
    }

    #[test]
    fn test_new_fails_when_storage_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::rooted_at(temp_dir.path());
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").unwrap();
        config.storage.root = blocker;

        assert!(matches!(
            AppState::new(config),
            Err(StateError::Storage(_))
        ));
    }
}
