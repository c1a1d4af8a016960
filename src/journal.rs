//! TTL Journal
//!
//! Append-only log of scheduled deletions. Every accepted upload adds one line:
//!
//! ```text
//! <expires_at RFC 3339, UTC, nanoseconds>,<ttl>,<absolute blob path>
//! ```
//!
//! Each append is synced to stable storage before returning, so the deletion
//! obligation survives a crash right after the upload response. The log is never
//! rewritten; readers rescan it in full and skip lines they cannot parse.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::duration::{format_duration, parse_duration, MAX_DURATION};

/// Journal errors
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Journal IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed journal record: {0}")]
    Parse(String),
}

/// One scheduled deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalRecord {
    pub expires_at: DateTime<Utc>,
    pub ttl: Duration,
    pub blob_path: PathBuf,
}

impl JournalRecord {
    /// Schedule deletion of `blob_path` at `now + ttl`.
    ///
    /// The TTL is clamped to [`MAX_DURATION`] and the expiration to the end of
    /// year 9999 so that every record parses back.
    pub fn schedule(now: DateTime<Utc>, ttl: Duration, blob_path: PathBuf) -> Self {
        let ttl = ttl.min(MAX_DURATION);
        let latest = latest_expiry();
        let expires_at = TimeDelta::from_std(ttl)
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .map_or(latest, |at| at.min(latest));

        Self {
            expires_at,
            ttl,
            blob_path,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Serialize as a single journal line, newline included.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{}\n",
            self.expires_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            format_duration(self.ttl),
            self.blob_path.display()
        )
    }
}

fn latest_expiry() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(9999, 12, 31)
        .and_then(|date| date.and_hms_opt(23, 59, 59))
        .map_or(DateTime::<Utc>::MAX_UTC, |naive| naive.and_utc())
}

impl FromStr for JournalRecord {
    type Err = JournalError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(3, ',');

        let (Some(expires), Some(ttl), Some(path)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(JournalError::Parse(format!(
                "expected 3 comma-separated fields in '{}'",
                line
            )));
        };

        let expires_at = DateTime::parse_from_rfc3339(expires.trim())
            .map_err(|e| JournalError::Parse(format!("invalid expiration '{}': {}", expires, e)))?
            .with_timezone(&Utc);

        let ttl = parse_duration(ttl)
            .map_err(|e| JournalError::Parse(format!("invalid ttl '{}': {}", ttl, e)))?;

        if path.is_empty() {
            return Err(JournalError::Parse("empty blob path".to_string()));
        }

        Ok(Self {
            expires_at,
            ttl,
            blob_path: PathBuf::from(path),
        })
    }
}

/// Result of a full journal scan
#[derive(Debug, Default)]
pub struct JournalScan {
    /// Parsed records, in file order
    pub records: Vec<JournalRecord>,
    /// Number of lines skipped because they could not be parsed
    pub malformed: usize,
}

/// File-backed TTL journal
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    append_lock: Mutex<()>,
}

impl Journal {
    /// Open the journal at `dir/file_name`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, file_name: &str) -> Result<Self, JournalError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(file_name),
            append_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and sync it to disk.
    ///
    /// Appends are serialized so concurrent writers never interleave lines.
    pub fn append(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let line = record.to_line();

        let _guard = self.append_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        Ok(())
    }

    /// Read every record in file order.
    ///
    /// A missing journal yields an empty scan. Malformed lines are logged and
    /// counted, never fatal.
    pub fn scan(&self) -> Result<JournalScan, JournalError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(JournalScan::default()),
            Err(e) => return Err(e.into()),
        };

        let mut reader = BufReader::new(file);
        let mut scan = JournalScan::default();
        let mut raw = Vec::new();
        let mut line_no = 0usize;

        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            line_no += 1;

            let Ok(line) = std::str::from_utf8(&raw) else {
                tracing::warn!(line = line_no, "Skipping journal line with invalid UTF-8");
                scan.malformed += 1;
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }

            match line.parse::<JournalRecord>() {
                Ok(record) => scan.records.push(record),
                Err(e) => {
                    tracing::warn!(line = line_no, error = %e, "Skipping malformed journal line");
                    scan.malformed += 1;
                }
            }
        }

        Ok(scan)
    }
}
