//! Upload coordination
//!
//! Drives a single upload through validation, content addressing, blob storage
//! and journaling. Everything request-specific lives in an [`UploadContext`]
//! owned by the caller; the coordinator only holds shared, immutable handles.

use std::io::{self, Read, Seek};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::addressing::{time_mixer, ContentAddresser, ContentId};
use crate::duration::{format_duration, parse_duration};
use crate::journal::{Journal, JournalRecord};
use crate::storage::{BlobStore, StoreError};

/// Per-request upload context
#[derive(Debug, Clone)]
pub struct UploadContext {
    /// Caller-supplied file name
    pub filename: String,
    /// Remote address, for audit logs
    pub remote_addr: String,
    /// Raw TTL value requested by the caller, if any
    pub requested_ttl: Option<String>,
}

/// Where the effective TTL came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlSource {
    /// The caller's value was valid and used
    Requested,
    /// No value was supplied
    Default,
    /// A value was supplied but could not be used
    Fallback,
}

/// Result of a successful upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub id: ContentId,
    #[serde(serialize_with = "serialize_ttl")]
    pub ttl: Duration,
    pub ttl_source: TtlSource,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// False when the journal append failed; the blob will not expire on its own
    pub journaled: bool,
}

fn serialize_ttl<S: serde::Serializer>(ttl: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_duration(*ttl))
}

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid upload: {0}")]
    Validation(String),

    #[error("File too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("Failed to read upload: {0}")]
    Read(#[from] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolve the effective TTL for a request.
///
/// Missing, unparseable or zero values fall back to `default`. Signed values
/// such as `-5m` do not parse, so they fall back too instead of expiring on the
/// next reconciliation pass.
pub fn resolve_ttl(requested: Option<&str>, default: Duration) -> (Duration, TtlSource) {
    match requested.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => (default, TtlSource::Default),
        Some(raw) => match parse_duration(raw) {
            Ok(ttl) if !ttl.is_zero() => (ttl, TtlSource::Requested),
            _ => (default, TtlSource::Fallback),
        },
    }
}

/// Check a caller-supplied file name.
pub fn validate_filename(filename: &str) -> Result<(), UploadError> {
    if filename.is_empty() {
        return Err(UploadError::Validation("empty file name".to_string()));
    }
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(UploadError::Validation("invalid file name".to_string()));
    }
    Ok(())
}

/// Orchestrates validate, address, store and journal for each upload
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    addresser: ContentAddresser,
    store: BlobStore,
    journal: Arc<Journal>,
    default_ttl: Duration,
    max_upload_bytes: u64,
    mixer: fn() -> Vec<u8>,
}

impl UploadCoordinator {
    pub fn new(
        addresser: ContentAddresser,
        store: BlobStore,
        journal: Arc<Journal>,
        default_ttl: Duration,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            addresser,
            store,
            journal,
            default_ttl,
            max_upload_bytes,
            mixer: time_mixer,
        }
    }

    /// Replace the mixing-value source fed into the hash before the content.
    pub fn with_mixer(mut self, mixer: fn() -> Vec<u8>) -> Self {
        self.mixer = mixer;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    /// Accept one upload of `size` bytes read from `content`.
    ///
    /// A journal append failure does not fail the upload; it is logged and
    /// reported through [`UploadReceipt::journaled`].
    pub fn accept<R: Read + Seek>(
        &self,
        ctx: &UploadContext,
        size: u64,
        mut content: R,
    ) -> Result<UploadReceipt, UploadError> {
        validate_filename(&ctx.filename)?;
        if size == 0 {
            return Err(UploadError::Validation("zero byte file uploaded".to_string()));
        }
        if size > self.max_upload_bytes {
            return Err(UploadError::TooLarge {
                size,
                max: self.max_upload_bytes,
            });
        }

        let (ttl, ttl_source) = resolve_ttl(ctx.requested_ttl.as_deref(), self.default_ttl);
        match ttl_source {
            TtlSource::Requested => {}
            TtlSource::Default => tracing::debug!(
                remote_addr = %ctx.remote_addr,
                ttl = %format_duration(ttl),
                "No TTL requested, using default"
            ),
            TtlSource::Fallback => tracing::warn!(
                remote_addr = %ctx.remote_addr,
                requested = ctx.requested_ttl.as_deref().unwrap_or_default(),
                ttl = %format_duration(ttl),
                "Invalid TTL requested, using default"
            ),
        }

        let mixer = (self.mixer)();
        let id = self.addresser.address(&mixer, &mut content)?;
        content.rewind()?;

        let blob = self.store.put(&id, &mut content)?;
        if blob.size_bytes != size {
            tracing::warn!(
                id = %id,
                declared = size,
                stored = blob.size_bytes,
                "Stored size differs from declared size"
            );
        }

        let record = JournalRecord::schedule(Utc::now(), ttl, blob.path.clone());
        let journaled = match self.journal.append(&record) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    id = %id,
                    path = %blob.path.display(),
                    error = %e,
                    "Failed to journal TTL; blob will not be deleted automatically"
                );
                false
            }
        };

        tracing::info!(
            remote_addr = %ctx.remote_addr,
            filename = %ctx.filename,
            id = %id,
            size_bytes = blob.size_bytes,
            ttl = %format_duration(ttl),
            expires_at = %record.expires_at,
            "Accepted upload"
        );

        Ok(UploadReceipt {
            id,
            ttl: record.ttl,
            ttl_source,
            expires_at: record.expires_at,
            size_bytes: blob.size_bytes,
            journaled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::HashKey;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    const DEFAULT_TTL: Duration = Duration::from_secs(300);

    struct Fixture {
        _temp_dir: TempDir,
        store: BlobStore,
        journal: Arc<Journal>,
        coordinator: UploadCoordinator,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = BlobStore::open(temp_dir.path().join("uploads")).unwrap();
        let journal = Arc::new(Journal::open(temp_dir.path().join("log"), "entries.log").unwrap());
        let coordinator = UploadCoordinator::new(
            ContentAddresser::new(HashKey::from_bytes([5u8; 32])),
            store.clone(),
            journal.clone(),
            DEFAULT_TTL,
            1024,
        );
        Fixture {
            _temp_dir: temp_dir,
            store,
            journal,
            coordinator,
        }
    }

    fn ctx(filename: &str, ttl: Option<&str>) -> UploadContext {
        UploadContext {
            filename: filename.to_string(),
            remote_addr: "127.0.0.1".to_string(),
            requested_ttl: ttl.map(str::to_string),
        }
    }

    fn fixed_mixer() -> Vec<u8> {
        b"2026-10-18T12:00:00.000000000Z".to_vec()
    }

    #[test]
    fn test_resolve_ttl() {
        assert_eq!(
            resolve_ttl(None, DEFAULT_TTL),
            (DEFAULT_TTL, TtlSource::Default)
        );
        assert_eq!(
            resolve_ttl(Some(""), DEFAULT_TTL),
            (DEFAULT_TTL, TtlSource::Default)
        );
        assert_eq!(
            resolve_ttl(Some("1s"), DEFAULT_TTL),
            (Duration::from_secs(1), TtlSource::Requested)
        );
        assert_eq!(
            resolve_ttl(Some("notaduration"), DEFAULT_TTL),
            (DEFAULT_TTL, TtlSource::Fallback)
        );
        assert_eq!(
            resolve_ttl(Some("0s"), DEFAULT_TTL),
            (DEFAULT_TTL, TtlSource::Fallback)
        );
        assert_eq!(
            resolve_ttl(Some("-5m"), DEFAULT_TTL),
            (DEFAULT_TTL, TtlSource::Fallback)
        );
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("../evil").is_err());
        assert!(validate_filename("dir/file").is_err());
        assert!(validate_filename("dir\\file").is_err());
    }

    #[test]
    fn test_accept_stores_and_journals() {
        let fx = fixture();
        let data = b"hello vanish";

        let receipt = fx
            .coordinator
            .accept(&ctx("hello.txt", Some("1s")), data.len() as u64, Cursor::new(data))
            .unwrap();

        assert_eq!(receipt.ttl, Duration::from_secs(1));
        assert_eq!(receipt.ttl_source, TtlSource::Requested);
        assert!(receipt.journaled);
        assert_eq!(fx.store.get(receipt.id.as_str()).unwrap(), data);

        let scan = fx.journal.scan().unwrap();
        assert_eq!(scan.records.len(), 1);
        assert_eq!(scan.records[0].blob_path, fx.store.path_for(&receipt.id));
        assert_eq!(scan.records[0].expires_at, receipt.expires_at);
    }

    #[test]
    fn test_invalid_ttl_falls_back_to_default() {
        let fx = fixture();
        let receipt = fx
            .coordinator
            .accept(&ctx("a.txt", Some("notaduration")), 1, Cursor::new(b"x"))
            .unwrap();

        assert_eq!(receipt.ttl, DEFAULT_TTL);
        assert_eq!(receipt.ttl_source, TtlSource::Fallback);
    }

    #[test]
    fn test_rejects_invalid_requests() {
        let fx = fixture();

        assert!(matches!(
            fx.coordinator.accept(&ctx("", None), 1, Cursor::new(b"x")),
            Err(UploadError::Validation(_))
        ));
        assert!(matches!(
            fx.coordinator.accept(&ctx("../x", None), 1, Cursor::new(b"x")),
            Err(UploadError::Validation(_))
        ));
        assert!(matches!(
            fx.coordinator.accept(&ctx("x", None), 0, Cursor::new(b"")),
            Err(UploadError::Validation(_))
        ));
        assert!(matches!(
            fx.coordinator.accept(&ctx("x", None), 4096, Cursor::new(vec![0u8; 4096])),
            Err(UploadError::TooLarge { size: 4096, max: 1024 })
        ));
        assert!(fx.journal.scan().unwrap().records.is_empty());
    }

    #[test]
    fn test_same_content_at_different_instants_gets_distinct_ids() {
        let fx = fixture();
        let data = b"same bytes";

        let first = fx
            .coordinator
            .accept(&ctx("a.txt", None), data.len() as u64, Cursor::new(data))
            .unwrap();
        std::thread::sleep(Duration::from_millis(2));
        let second = fx
            .coordinator
            .accept(&ctx("a.txt", None), data.len() as u64, Cursor::new(data))
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(fx.store.get(first.id.as_str()).unwrap(), data);
        assert_eq!(fx.store.get(second.id.as_str()).unwrap(), data);
    }

    #[test]
    fn test_forced_collision_is_rejected_and_first_blob_intact() {
        let fx = fixture();
        let coordinator = fx.coordinator.clone().with_mixer(fixed_mixer);
        let data = b"colliding bytes";

        let first = coordinator
            .accept(&ctx("a.txt", None), data.len() as u64, Cursor::new(data))
            .unwrap();
        let second =
            coordinator.accept(&ctx("b.txt", None), data.len() as u64, Cursor::new(data));

        assert!(matches!(
            second,
            Err(UploadError::Store(StoreError::Collision(_)))
        ));
        assert_eq!(fx.store.get(first.id.as_str()).unwrap(), data);
        assert_eq!(fx.journal.scan().unwrap().records.len(), 1);
    }

    #[test]
    fn test_concurrent_accepts_stay_isolated() {
        let fx = fixture();
        let coordinator = fx.coordinator.clone().with_mixer(fixed_mixer);
        let addresser = ContentAddresser::new(HashKey::from_bytes([5u8; 32]));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let coordinator = coordinator.clone();
                std::thread::spawn(move || {
                    let data = format!("payload from thread {}", t).repeat(t + 1).into_bytes();
                    let receipt = coordinator
                        .accept(
                            &ctx(&format!("file-{}.txt", t), Some("1h")),
                            data.len() as u64,
                            Cursor::new(data.clone()),
                        )
                        .unwrap();
                    (receipt, data)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for (receipt, data) in &results {
            let expected = addresser
                .address(&fixed_mixer(), Cursor::new(data.as_slice()))
                .unwrap();
            assert_eq!(receipt.id, expected);
            assert_eq!(&fx.store.get(receipt.id.as_str()).unwrap(), data);
        }

        let scan = fx.journal.scan().unwrap();
        assert_eq!(scan.records.len(), 8);
        assert_eq!(scan.malformed, 0);
        for (receipt, _) in &results {
            let path = fx.store.path_for(&receipt.id);
            assert!(scan.records.iter().any(|r| r.blob_path == path));
        }
    }

    #[test]
    fn test_journal_failure_still_reports_success() {
        let fx = fixture();
        // Turn the journal path into a directory so appends fail
        fs::create_dir_all(fx.journal.path()).unwrap();

        let receipt = fx
            .coordinator
            .accept(&ctx("a.txt", None), 1, Cursor::new(b"x"))
            .unwrap();

        assert!(!receipt.journaled);
        assert_eq!(fx.store.get(receipt.id.as_str()).unwrap(), b"x");
    }
}
