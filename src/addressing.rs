//! Keyed content addressing
//!
//! A content identifier is the hex-encoded HMAC-SHA256 of a per-request mixing
//! value followed by the uploaded bytes. The key is a process-wide secret, so
//! identifiers cannot be predicted by anyone who does not hold it.
//!
//! The mixing value defaults to the current wall-clock time at nanosecond
//! resolution. Identical bytes uploaded at different instants therefore get
//! different identifiers; two uploads that end up with the same identifier are
//! rejected by the blob store's exclusive create.

use std::fmt;
use std::io::{self, Read};

use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hash key length in bytes (256-bit key)
pub const KEY_LEN: usize = 32;

/// Length of a hex-encoded identifier
pub const ID_HEX_LEN: usize = 64;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Errors produced when loading a hash key
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("hash key is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("hash key must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Secret key for content addressing
#[derive(Clone, PartialEq, Eq)]
pub struct HashKey([u8; KEY_LEN]);

impl HashKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 64-character hex form.
    pub fn from_hex(encoded: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(encoded.trim())?;
        let actual = bytes.len();
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: KEY_LEN,
            actual,
        })?;
        Ok(Self(key))
    }

    /// Generate a random key from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill(&mut key);
        Self(key)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HashKey(<redacted>)")
    }
}

/// Hex-encoded content identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Computes content identifiers with a fixed key
#[derive(Debug, Clone)]
pub struct ContentAddresser {
    key: HashKey,
}

impl ContentAddresser {
    pub fn new(key: HashKey) -> Self {
        Self { key }
    }

    /// Digest `mixer` followed by everything readable from `reader`.
    ///
    /// Every call starts from a freshly keyed MAC, so concurrent callers never
    /// share hash state.
    pub fn address<R: Read>(&self, mixer: &[u8], mut reader: R) -> io::Result<ContentId> {
        let mut mac = HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        mac.update(mixer);

        let mut buf = vec![0u8; READ_BUF_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            mac.update(&buf[..n]);
        }

        Ok(ContentId(hex::encode(mac.finalize().into_bytes())))
    }
}

/// Default mixing value: the current UTC time with nanosecond precision.
pub fn time_mixer() -> Vec<u8> {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn addresser() -> ContentAddresser {
        ContentAddresser::new(HashKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn test_identifier_is_hex_of_fixed_length() {
        let id = addresser().address(b"mix", Cursor::new(b"hello")).unwrap();
        assert_eq!(id.as_str().len(), ID_HEX_LEN);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_mixer_and_content_is_deterministic() {
        let a = addresser().address(b"mix", Cursor::new(b"payload")).unwrap();
        let b = addresser().address(b"mix", Cursor::new(b"payload")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mixer_changes_identifier() {
        let a = addresser().address(b"t1", Cursor::new(b"payload")).unwrap();
        let b = addresser().address(b"t2", Cursor::new(b"payload")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_changes_identifier() {
        let other = ContentAddresser::new(HashKey::from_bytes([8u8; KEY_LEN]));
        let a = addresser().address(b"mix", Cursor::new(b"payload")).unwrap();
        let b = other.address(b"mix", Cursor::new(b"payload")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_large_input_spans_multiple_reads() {
        let data = vec![0xABu8; READ_BUF_SIZE * 3 + 17];
        let a = addresser().address(b"mix", Cursor::new(&data)).unwrap();
        let b = addresser().address(b"mix", Cursor::new(&data)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_read_errors_propagate() {
        struct FailingReader;
        impl Read for FailingReader {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream closed"))
            }
        }

        let err = addresser().address(b"mix", FailingReader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_key_from_hex() {
        let key = HashKey::from_hex(
            "000102030405060708090A0B0C0D0E0FF0E0D0C0B0A090807060504030201000",
        )
        .unwrap();
        assert_eq!(key.as_bytes()[1], 0x01);
        assert_eq!(key.as_bytes()[31], 0x00);

        assert!(matches!(
            HashKey::from_hex("abcd"),
            Err(KeyError::InvalidLength { actual: 2, .. })
        ));
        assert!(matches!(HashKey::from_hex("zz"), Err(KeyError::InvalidHex(_))));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = HashKey::from_bytes([9u8; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "HashKey(<redacted>)");
    }

    #[test]
    fn test_generated_keys_differ() {
        assert_ne!(HashKey::generate(), HashKey::generate());
    }
}
