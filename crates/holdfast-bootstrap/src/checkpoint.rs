//! Per-step checkpoint persistence
//!
//! One checkpoint file per host records how far the bootstrap pipeline got.
//! A `done` checkpoint is persisted before the next step starts, so a crash
//! or reboot resumes at the first non-done step instead of re-running
//! completed (possibly non-idempotent) work.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Status of one bootstrap step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Checkpoint record for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub step_name: String,
    pub status: StepStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            status: StepStatus::Pending,
            attempt_count: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

/// The host's persisted checkpoint sequence
#[derive(Debug)]
pub struct CheckpointFile {
    path: PathBuf,
    checkpoints: BTreeMap<String, Checkpoint>,
}

impl CheckpointFile {
    /// Load existing checkpoints, or start empty if the file does not exist
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let checkpoints = match fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, checkpoints })
    }

    pub fn get(&self, step_name: &str) -> Option<&Checkpoint> {
        self.checkpoints.get(step_name)
    }

    /// Whether a step has already completed
    pub fn is_done(&self, step_name: &str) -> bool {
        self.get(step_name)
            .is_some_and(|c| c.status == StepStatus::Done)
    }

    /// Mark a step as running and count the attempt; persists immediately
    pub async fn mark_running(&mut self, step_name: &str) -> Result<()> {
        let checkpoint = self
            .checkpoints
            .entry(step_name.to_string())
            .or_insert_with(|| Checkpoint::new(step_name));
        checkpoint.status = StepStatus::Running;
        checkpoint.attempt_count += 1;
        checkpoint.updated_at = Utc::now();
        self.save().await
    }

    /// Mark a step as done; persisted before the next step may start
    pub async fn mark_done(&mut self, step_name: &str) -> Result<()> {
        let checkpoint = self
            .checkpoints
            .entry(step_name.to_string())
            .or_insert_with(|| Checkpoint::new(step_name));
        checkpoint.status = StepStatus::Done;
        checkpoint.last_error = None;
        checkpoint.updated_at = Utc::now();
        self.save().await
    }

    /// Record a failed attempt with its error
    pub async fn mark_failed(&mut self, step_name: &str, error: &str) -> Result<()> {
        let checkpoint = self
            .checkpoints
            .entry(step_name.to_string())
            .or_insert_with(|| Checkpoint::new(step_name));
        checkpoint.status = StepStatus::Failed;
        checkpoint.last_error = Some(error.to_string());
        checkpoint.updated_at = Utc::now();
        self.save().await
    }

    pub fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    /// Atomic write: temp file then rename, so a crash mid-save never
    /// leaves a torn checkpoint file
    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&self.checkpoints)?;
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let file = CheckpointFile::load(dir.path().join("checkpoints.json"))
            .await
            .unwrap();
        assert!(!file.is_done("runtime-install"));
    }

    #[tokio::test]
    async fn test_transitions_survive_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let mut file = CheckpointFile::load(&path).await.unwrap();
        file.mark_running("runtime-install").await.unwrap();
        file.mark_done("runtime-install").await.unwrap();
        file.mark_running("config-materialize").await.unwrap();
        file.mark_failed("config-materialize", "disk full").await.unwrap();

        let reloaded = CheckpointFile::load(&path).await.unwrap();
        assert!(reloaded.is_done("runtime-install"));
        let failed = reloaded.get("config-materialize").unwrap();
        assert_eq!(failed.status, StepStatus::Failed);
        assert_eq!(failed.attempt_count, 1);
        assert_eq!(failed.last_error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_attempt_count_accumulates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let mut file = CheckpointFile::load(&path).await.unwrap();
        for _ in 0..3 {
            file.mark_running("step").await.unwrap();
            file.mark_failed("step", "boom").await.unwrap();
        }
        assert_eq!(file.get("step").unwrap().attempt_count, 3);
    }

    #[tokio::test]
    async fn test_done_clears_last_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoints.json");

        let mut file = CheckpointFile::load(&path).await.unwrap();
        file.mark_running("step").await.unwrap();
        file.mark_failed("step", "boom").await.unwrap();
        file.mark_running("step").await.unwrap();
        file.mark_done("step").await.unwrap();

        let checkpoint = file.get("step").unwrap();
        assert_eq!(checkpoint.status, StepStatus::Done);
        assert!(checkpoint.last_error.is_none());
        assert_eq!(checkpoint.attempt_count, 2);
    }
}
