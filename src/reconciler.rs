//! Background reconciliation of the TTL journal against the blob store.
//!
//! On every tick the reconciler rescans the whole journal and deletes the blob
//! of each record whose expiration has passed. Individual failures are logged
//! and never stop the scan. The first tick runs immediately, so deletions that
//! fell due while the process was down are enforced right after a restart.
//!
//! The task stops when its `CancellationToken` is cancelled. A scan already in
//! progress runs to completion first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::duration::format_duration;
use crate::journal::{Journal, JournalError};
use crate::storage::{BlobStore, DeleteOutcome};

/// Outcome counters for a single reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records parsed from the journal
    pub scanned: usize,
    /// Lines skipped as malformed
    pub malformed: usize,
    /// Records whose expiration has passed
    pub expired: usize,
    /// Expired blobs removed in this pass
    pub deleted: usize,
    /// Expired records whose blob was already absent
    pub already_gone: usize,
    /// Expired records whose deletion failed
    pub failed: usize,
    /// Records not yet expired
    pub pending: usize,
}

/// Deletes expired blobs listed in the journal
#[derive(Debug, Clone)]
pub struct Reconciler {
    journal: Arc<Journal>,
    store: BlobStore,
    interval: Duration,
}

/// Shortest period between passes
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl Reconciler {
    /// Periods below one millisecond are raised to it.
    pub fn new(journal: Arc<Journal>, store: BlobStore, interval: Duration) -> Self {
        Self {
            journal,
            store,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one pass against the current wall-clock time.
    pub fn reconcile_now(&self) -> Result<ReconcileReport, JournalError> {
        self.reconcile_at(Utc::now())
    }

    /// Run one pass, treating `now` as the current time.
    ///
    /// Only a journal that cannot be read at all is an error.
    pub fn reconcile_at(&self, now: DateTime<Utc>) -> Result<ReconcileReport, JournalError> {
        let scan = self.journal.scan()?;

        let mut report = ReconcileReport {
            scanned: scan.records.len(),
            malformed: scan.malformed,
            ..Default::default()
        };

        for record in &scan.records {
            if !record.is_expired(now) {
                report.pending += 1;
                continue;
            }
            report.expired += 1;

            match self.store.delete(&record.blob_path) {
                Ok(DeleteOutcome::Removed) => {
                    report.deleted += 1;
                    info!(
                        path = %record.blob_path.display(),
                        ttl = %format_duration(record.ttl),
                        expires_at = %record.expires_at,
                        "Deleted blob after TTL expiration"
                    );
                }
                Ok(DeleteOutcome::AlreadyGone) => {
                    report.already_gone += 1;
                    debug!(path = %record.blob_path.display(), "Expired blob already absent");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        path = %record.blob_path.display(),
                        error = %e,
                        "Failed to delete expired blob"
                    );
                }
            }
        }

        Ok(report)
    }

    /// Spawn the periodic reconciliation task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let this = Arc::new(self);
        let mut ticker = interval(this.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval = %format_duration(this.interval),
            journal = %this.journal.path().display(),
            "Reconciler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Reconciler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    debug!("Checking journal for pending deletions");
                    let pass = this.clone();
                    match tokio::task::spawn_blocking(move || pass.reconcile_now()).await {
                        Ok(Ok(report)) => log_report(&report),
                        Ok(Err(e)) => error!(error = %e, "Reconciliation pass failed"),
                        Err(e) => error!(error = %e, "Reconciliation task join error"),
                    }
                }
            }
        }
    }
}

fn log_report(report: &ReconcileReport) {
    if report.deleted > 0 || report.failed > 0 || report.malformed > 0 {
        info!(
            scanned = report.scanned,
            expired = report.expired,
            deleted = report.deleted,
            already_gone = report.already_gone,
            failed = report.failed,
            pending = report.pending,
            malformed = report.malformed,
            "Reconciliation pass complete"
        );
    } else {
        debug!(
            scanned = report.scanned,
            pending = report.pending,
            "Reconciliation pass complete, nothing to delete"
        );
    }
}
