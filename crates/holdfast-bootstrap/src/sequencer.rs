//! The bootstrap pipeline driver
//!
//! Runs the ordered steps one at a time under the host guard. A step starts
//! only when its predecessor's `done` checkpoint is persisted; a failed
//! step retries with bounded exponential backoff and exhausting the budget
//! halts the whole sequence fatally. Re-invocation resumes at the first
//! step that is not `done`.

use crate::certstore::CertStoreInit;
use crate::checkpoint::CheckpointFile;
use crate::error::{BootstrapError, Result};
use crate::guard::RunGuard;
use crate::install::RuntimeInstall;
use crate::materialize::ConfigMaterialize;
use crate::precondition::PreconditionWait;
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use crate::workload::WorkloadStart;
use holdfast_deploy::RetryConfig;
use tokio::time::sleep;

const GUARD_FILE: &str = "bootstrap.pid";
const CHECKPOINT_FILE: &str = "bootstrap-checkpoints.json";

/// What a completed run did
#[derive(Debug, Default)]
pub struct SequenceReport {
    /// Steps executed in this run, in order
    pub completed: Vec<String>,

    /// Steps skipped because an earlier run already finished them
    pub skipped: Vec<String>,

    /// Non-fatal warnings recorded along the way (step name, message)
    pub warnings: Vec<(String, String)>,
}

/// Ordered, checkpointed step pipeline for one host
pub struct Sequencer {
    steps: Vec<Box<dyn BootstrapStep>>,
    retry: RetryConfig,
}

impl Sequencer {
    /// The standard five-step convergence pipeline
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(RuntimeInstall),
            Box::new(ConfigMaterialize),
            Box::new(CertStoreInit),
            Box::new(PreconditionWait),
            Box::new(WorkloadStart),
        ])
    }

    pub fn new(steps: Vec<Box<dyn BootstrapStep>>) -> Self {
        Self {
            steps,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run (or resume) the sequence
    ///
    /// Returns [`BootstrapError::StepFatal`] when a step exhausts its retry
    /// budget; the failing checkpoint stays `failed` on disk so the next
    /// invocation resumes there after the operator intervenes.
    pub async fn run(&self, ctx: &StepContext) -> Result<SequenceReport> {
        tokio::fs::create_dir_all(&ctx.state_dir).await?;
        let guard = RunGuard::acquire(ctx.state_dir.join(GUARD_FILE)).await?;

        let result = self.run_guarded(ctx).await;

        // Best-effort: drop cleans the pid file up if this fails
        if let Err(e) = guard.release().await {
            tracing::warn!("Failed to remove bootstrap guard: {}", e);
        }
        result
    }

    async fn run_guarded(&self, ctx: &StepContext) -> Result<SequenceReport> {
        let mut checkpoints = CheckpointFile::load(ctx.state_dir.join(CHECKPOINT_FILE)).await?;
        let mut report = SequenceReport::default();

        for step in &self.steps {
            let name = step.name();
            if checkpoints.is_done(name) {
                tracing::debug!("Step '{}' already done, skipping", name);
                report.skipped.push(name.to_string());
                continue;
            }

            let mut attempts = 0u32;
            loop {
                attempts += 1;
                checkpoints.mark_running(name).await?;
                tracing::info!("Running step '{}' (attempt {})", name, attempts);

                match step.run(ctx).await {
                    Ok(outcome) => {
                        // Persist `done` before the next step may start
                        checkpoints.mark_done(name).await?;
                        if let StepOutcome::CompletedWithWarning(warning) = outcome {
                            report.warnings.push((name.to_string(), warning));
                        }
                        report.completed.push(name.to_string());
                        break;
                    }
                    Err(e) => {
                        let message = e.to_string();
                        checkpoints.mark_failed(name, &message).await?;

                        if attempts >= self.retry.max_attempts {
                            tracing::error!(
                                "Step '{}' failed fatally after {} attempts: {}",
                                name,
                                attempts,
                                message
                            );
                            return Err(BootstrapError::StepFatal {
                                step: name.to_string(),
                                attempts,
                                last_error: message,
                            });
                        }

                        let delay = self.retry.delay_for_attempt(attempts - 1);
                        tracing::warn!(
                            "Step '{}' failed (attempt {}): {}; retrying in {:?}",
                            name,
                            attempts,
                            message,
                            delay
                        );
                        sleep(delay).await;
                    }
                }
            }
        }

        Ok(report)
    }
}
