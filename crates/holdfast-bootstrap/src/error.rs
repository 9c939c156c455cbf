//! Bootstrap sequencer error types

use thiserror::Error;

/// Bootstrap errors
#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error(
        "Step '{step}' failed fatally after {attempts} attempts\nLast error: {last_error}\n\nHint:\n  • the sequence is halted; fix the cause and re-run to resume at this step"
    )]
    StepFatal {
        step: String,
        attempts: u32,
        last_error: String,
    },

    #[error(
        "Another bootstrap run is active on this host (pid {pid})\n\nHint:\n  • wait for it to finish, or remove the guard file if the pid is dead"
    )]
    GuardHeld { pid: u32 },

    #[error("Command failed: {command}\n{detail}")]
    CommandFailed { command: String, detail: String },

    #[error("Container engine error: {0}")]
    ContainerEngine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<bollard::errors::Error> for BootstrapError {
    fn from(err: bollard::errors::Error) -> Self {
        BootstrapError::ContainerEngine(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
