//! State blob and version record types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A decrypted state snapshot at a specific version
#[derive(Debug, Clone)]
pub struct StateBlob {
    /// State key this blob belongs to
    pub key: String,

    /// Version number, strictly increasing per key starting at 1
    pub version: u64,

    /// Hex SHA-256 of the plaintext payload
    pub checksum: String,

    /// Decrypted payload bytes (opaque to the store)
    pub payload: Vec<u8>,

    /// Fence token the writer presented, if any
    pub fence_token: Option<u64>,

    /// When this version was committed
    pub written_at: DateTime<Utc>,
}

/// Metadata for one historical version, used for audit listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: u64,
    pub checksum: String,
    pub fence_token: Option<u64>,
    pub written_at: DateTime<Utc>,

    /// Plaintext payload size in bytes
    pub size: u64,
}

/// Compute the hex SHA-256 checksum of a payload
pub fn checksum(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
        assert_eq!(checksum(b"").len(), 64);
    }
}
