//! Configuration management for Vanish Server

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::addressing::{HashKey, KeyError};
use crate::duration::{parse_duration, DurationError};

/// Request/response header carrying the content identifier
pub const FILE_ID_HEADER: &str = "x-file-id";

/// Request/response header carrying the TTL
pub const TTL_HEADER: &str = "x-ttl";

const DEFAULT_STORAGE_DIR: &str = "/tmp/vanishling/uploads";
const DEFAULT_LOG_DIR: &str = "/tmp/vanishling/log";
const DEFAULT_LOG_FILE: &str = "entries.log";
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 32 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}: invalid number '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var}: {source}")]
    InvalidDuration {
        var: &'static str,
        #[source]
        source: DurationError,
    },

    #[error("{var} must be greater than zero")]
    ZeroValue { var: &'static str },

    #[error("VANISH_HASH_KEY: {0}")]
    InvalidHashKey(#[from] KeyError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub journal: JournalConfig,
    pub retention: RetentionConfig,
    pub hashing: HashingConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding one file per blob
    pub root: PathBuf,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub dir: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// TTL applied when the caller supplies none or an invalid one
    pub default_ttl: Duration,
    /// Time between reconciliation passes
    pub reconcile_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct HashingConfig {
    pub key: HashKey,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageConfig {
                root: PathBuf::from(DEFAULT_STORAGE_DIR),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            journal: JournalConfig {
                dir: PathBuf::from(DEFAULT_LOG_DIR),
                file_name: DEFAULT_LOG_FILE.to_string(),
            },
            retention: RetentionConfig {
                default_ttl: DEFAULT_TTL,
                reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            },
            hashing: HashingConfig {
                key: HashKey::generate(),
            },
        }
    }
}

impl Config {
    /// Defaults with storage and journal placed under `data_dir`.
    pub fn rooted_at(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        let mut config = Config::default();
        config.storage.root = data_dir.join("uploads");
        config.journal.dir = data_dir.join("log");
        config
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let key = match var("VANISH_HASH_KEY") {
            Some(encoded) => HashKey::from_hex(&encoded)?,
            None => {
                tracing::warn!(
                    "VANISH_HASH_KEY not set, using a random key for this process lifetime"
                );
                defaults.hashing.key
            }
        };

        Ok(Config {
            server: ServerConfig {
                host: var("VANISH_HOST").unwrap_or(defaults.server.host),
                port: match var("PORT") {
                    Some(raw) => parse_number("PORT", &raw)?,
                    None => defaults.server.port,
                },
            },
            storage: StorageConfig {
                root: var("VANISH_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.root),
                max_upload_bytes: match var("VANISH_MAX_UPLOAD_BYTES") {
                    Some(raw) => non_zero(
                        "VANISH_MAX_UPLOAD_BYTES",
                        parse_number("VANISH_MAX_UPLOAD_BYTES", &raw)?,
                    )?,
                    None => defaults.storage.max_upload_bytes,
                },
            },
            journal: JournalConfig {
                dir: var("VANISH_LOG_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.journal.dir),
                file_name: var("VANISH_LOG_FILE").unwrap_or(defaults.journal.file_name),
            },
            retention: RetentionConfig {
                default_ttl: match var("VANISH_DEFAULT_TTL") {
                    Some(raw) => parse_positive_duration("VANISH_DEFAULT_TTL", &raw)?,
                    None => defaults.retention.default_ttl,
                },
                reconcile_interval: match var("VANISH_RECONCILE_INTERVAL") {
                    Some(raw) => parse_positive_duration("VANISH_RECONCILE_INTERVAL", &raw)?,
                    None => defaults.retention.reconcile_interval,
                },
            },
            hashing: HashingConfig { key },
        })
    }
}

/// Read an environment variable, treating empty values as unset.
fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

fn non_zero(var: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::ZeroValue { var });
    }
    Ok(value)
}

fn parse_positive_duration(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let value =
        parse_duration(raw).map_err(|source| ConfigError::InvalidDuration { var, source })?;
    if value.is_zero() {
        return Err(ConfigError::ZeroValue { var });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/vanishling/uploads"));
        assert_eq!(config.journal.dir, PathBuf::from("/tmp/vanishling/log"));
        assert_eq!(config.journal.file_name, "entries.log");
        assert_eq!(config.retention.default_ttl, Duration::from_secs(300));
        assert_eq!(config.retention.reconcile_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_rooted_at() {
        let config = Config::rooted_at("/srv/vanish");
        assert_eq!(config.storage.root, PathBuf::from("/srv/vanish/uploads"));
        assert_eq!(config.journal.dir, PathBuf::from("/srv/vanish/log"));
    }

    #[test]
    fn test_value_parsers() {
        assert_eq!(parse_number::<u16>("PORT", " 9000 ").unwrap(), 9000);
        assert!(matches!(
            parse_number::<u16>("PORT", "99999"),
            Err(ConfigError::InvalidNumber { var: "PORT", .. })
        ));
        assert_eq!(
            parse_positive_duration("VANISH_DEFAULT_TTL", "10m").unwrap(),
            Duration::from_secs(600)
        );
        assert!(matches!(
            parse_positive_duration("VANISH_DEFAULT_TTL", "0s"),
            Err(ConfigError::ZeroValue { .. })
        ));
        assert!(matches!(
            parse_positive_duration("VANISH_RECONCILE_INTERVAL", "soon"),
            Err(ConfigError::InvalidDuration { .. })
        ));
        assert!(matches!(
            non_zero("VANISH_MAX_UPLOAD_BYTES", 0),
            Err(ConfigError::ZeroValue { .. })
        ));
    }
}
