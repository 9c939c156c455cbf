//! Lock manager error types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Lock manager errors
#[derive(Error, Debug)]
pub enum LockError {
    #[error(
        "Lock on '{resource_id}' is held by {holder} until {expires_at}\n\nHint:\n  • another apply is in progress; back off and retry\n  • a crashed holder's lease self-expires, no manual cleanup is needed"
    )]
    Held {
        resource_id: String,
        holder: String,
        expires_at: DateTime<Utc>,
    },

    #[error(
        "Lock lease on '{resource_id}' was lost (expired or stolen)\n\nHint:\n  • re-acquire the lock and retry the whole operation"
    )]
    Lost { resource_id: String },

    #[error("Invalid resource id '{0}': only [A-Za-z0-9._-] is allowed")]
    InvalidResource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;
