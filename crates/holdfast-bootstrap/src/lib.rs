//! Holdfast Bootstrap Sequencer
//!
//! Brings a freshly booted (or redeployed) host to its target configuration
//! exactly once, safely, even when the run is interrupted, retried or
//! re-triggered. The pipeline is a fixed, ordered set of idempotent steps
//! with a persisted checkpoint per step:
//!
//! ```text
//! runtime-install ──▶ config-materialize ──▶ cert-store-init
//!        ──▶ precondition-wait ──▶ workload-start
//! ```
//!
//! Each `done` checkpoint is written before the next step starts, so a
//! crash resumes at the first unfinished step. Failed steps retry with
//! bounded backoff; an exhausted budget halts the sequence loudly. A
//! pid-file guard keeps a re-invoked sequencer from racing a still-live
//! previous instance on the same host.

pub mod certstore;
pub mod checkpoint;
pub mod error;
pub mod guard;
pub mod install;
pub mod materialize;
pub mod precondition;
pub mod sequencer;
pub mod step;
pub mod workload;

// Re-exports
pub use certstore::CertStoreInit;
pub use checkpoint::{Checkpoint, CheckpointFile, StepStatus};
pub use error::{BootstrapError, Result};
pub use guard::RunGuard;
pub use install::{PackageManager, RuntimeInstall};
pub use materialize::ConfigMaterialize;
pub use precondition::PreconditionWait;
pub use sequencer::{SequenceReport, Sequencer};
pub use step::{BootstrapStep, StepContext, StepOutcome};
pub use workload::WorkloadStart;
