//! Coordinator error types

use holdfast_lock::LockError;
use holdfast_store::StoreError;
use thiserror::Error;

/// State coordination errors
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Mutation failed: {0}")]
    Mutation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Whether retrying the whole apply can succeed
    ///
    /// Conflicts, held locks and transient IO are recoverable by re-reading
    /// and retrying; corrupt data or invalid input is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DeployError::Store(StoreError::Conflict { .. }) => true,
            DeployError::Store(StoreError::StaleFence { .. }) => true,
            DeployError::Store(StoreError::Io(_)) => true,
            DeployError::Lock(LockError::Held { .. }) => true,
            DeployError::Lock(LockError::Lost { .. }) => true,
            DeployError::Lock(LockError::Io(_)) => true,
            DeployError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
