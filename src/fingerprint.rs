//! Content fingerprints: the cache key.
//!
//! A fingerprint is the SHA-256 digest of a file's complete raw bytes. The
//! filename and declared content type play no part in it, so two uploads of
//! identical bytes always resolve to the same cache entry.

use crate::error::FileCacheError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// 256-bit SHA-256 digest of a file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileFingerprint([u8; 32]);

impl FileFingerprint {
    /// Fingerprint the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        hash_content(bytes)
    }

    pub fn from_bytes(digest: [u8; 32]) -> Self {
        Self(digest)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex, 64 characters.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

/// Compute the fingerprint of `bytes`.
///
/// Pure and total: hashing cannot fail and never suspends.
pub fn hash_content(bytes: &[u8]) -> FileFingerprint {
    let digest = Sha256::digest(bytes);
    FileFingerprint(digest.into())
}

impl fmt::Display for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileFingerprint({})", self.short())
    }
}

impl FromStr for FileFingerprint {
    type Err = FileCacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FileCacheError::InvalidFingerprint {
            input: s.to_string(),
        };
        let raw = hex::decode(s.trim()).map_err(|_| invalid())?;
        let digest: [u8; 32] = raw.try_into().map_err(|_| invalid())?;
        Ok(Self(digest))
    }
}

impl Serialize for FileFingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileFingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
