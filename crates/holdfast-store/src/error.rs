//! Object store error types

use thiserror::Error;

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "Version conflict on '{key}': expected version {expected}, store has {actual}\n\nHint:\n  • another writer committed first; re-read the latest state and retry"
    )]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error(
        "Stale fence token {fence} for '{key}' (store floor is {floor})\n\nHint:\n  • the lock lease backing this write has expired; re-acquire the lock and retry"
    )]
    StaleFence { key: String, fence: u64, floor: u64 },

    #[error("Version {version} of '{key}' does not exist")]
    VersionNotFound { key: String, version: u64 },

    #[error("Invalid state key '{0}': only [A-Za-z0-9._-] is allowed")]
    InvalidKey(String),

    #[error("Checksum mismatch reading '{key}' version {version}: stored data is corrupt")]
    ChecksumMismatch { key: String, version: u64 },

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
