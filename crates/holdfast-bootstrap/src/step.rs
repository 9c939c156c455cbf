//! Step trait and execution context

use crate::error::Result;
use crate::install::PackageManager;
use holdfast_deploy::DeploymentTarget;
use std::path::PathBuf;
use std::time::Duration;

/// How a step finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Completed,

    /// The step proceeded past a non-fatal condition (e.g. a precondition
    /// deadline); the warning is logged and recorded, not escalated
    CompletedWithWarning(String),
}

/// Everything a step may touch on the host
#[derive(Debug, Clone)]
pub struct StepContext {
    /// The immutable configuration handed off by the coordinator
    pub target: DeploymentTarget,

    /// Host-local holdfast state directory
    pub state_dir: PathBuf,

    /// Where materialized configuration lands
    pub config_dir: PathBuf,

    /// Certificate store file, initialized create-if-absent
    pub cert_store_path: PathBuf,

    /// Target OS package tooling for the runtime install
    pub package_manager: PackageManager,

    /// Overall deadline for the precondition wait
    pub dns_timeout: Duration,

    /// Poll interval between resolution attempts
    pub dns_poll_interval: Duration,
}

impl StepContext {
    pub fn new(target: DeploymentTarget, state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            target,
            config_dir: state_dir.join("config"),
            cert_store_path: state_dir.join("certs").join("store.json"),
            state_dir,
            package_manager: PackageManager::GetDockerScript,
            dns_timeout: Duration::from_secs(120),
            dns_poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_package_manager(mut self, pm: PackageManager) -> Self {
        self.package_manager = pm;
        self
    }

    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }
}

/// One ordered step of the bootstrap pipeline
#[async_trait::async_trait]
pub trait BootstrapStep: Send + Sync {
    /// Stable name, used as the checkpoint key
    fn name(&self) -> &str;

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome>;
}
