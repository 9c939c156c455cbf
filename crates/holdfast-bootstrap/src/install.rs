//! Container runtime installation
//!
//! The target OS and its package tooling are an opaque parameter: the same
//! pipeline converges an Ubuntu host through apt, a Fedora-family host
//! through dnf, or any Linux through the vendor convenience script. The
//! step is a no-op when the runtime already answers, so re-runs never
//! reinstall.

use crate::error::{BootstrapError, Result};
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use tokio::process::Command;

/// apt-based install (Debian/Ubuntu hosts)
pub const APT_INSTALL: &str = r#"#!/bin/sh
set -e
apt-get update -qq
apt-get install -y -qq docker.io docker-compose-v2
systemctl enable docker
systemctl start docker
"#;

/// dnf-based install (Fedora/Amazon Linux hosts)
pub const DNF_INSTALL: &str = r#"#!/bin/sh
set -e
dnf install -y -q docker docker-compose-plugin
systemctl enable docker
systemctl start docker
"#;

/// Vendor convenience script, distribution-agnostic
pub const GET_DOCKER_INSTALL: &str = r#"#!/bin/sh
set -e
curl -fsSL https://get.docker.com | sh
systemctl enable docker
systemctl start docker
"#;

/// Package tooling of the target host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    Apt,
    Dnf,
    GetDockerScript,
}

impl PackageManager {
    pub fn install_script(&self) -> &'static str {
        match self {
            PackageManager::Apt => APT_INSTALL,
            PackageManager::Dnf => DNF_INSTALL,
            PackageManager::GetDockerScript => GET_DOCKER_INSTALL,
        }
    }
}

impl std::str::FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "apt" => Ok(PackageManager::Apt),
            "dnf" => Ok(PackageManager::Dnf),
            "get-docker" => Ok(PackageManager::GetDockerScript),
            other => Err(format!(
                "unknown package manager '{}' (expected apt, dnf or get-docker)",
                other
            )),
        }
    }
}

/// Pipeline step 1: install the container runtime
pub struct RuntimeInstall;

#[async_trait::async_trait]
impl BootstrapStep for RuntimeInstall {
    fn name(&self) -> &str {
        "runtime-install"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome> {
        if runtime_present().await {
            tracing::debug!("Container runtime already installed, skipping");
            return Ok(StepOutcome::Completed);
        }

        let script = ctx.package_manager.install_script();
        tracing::info!(
            "Installing container runtime via {:?}",
            ctx.package_manager
        );
        run_shell(script).await?;

        if runtime_present().await {
            Ok(StepOutcome::Completed)
        } else {
            Err(BootstrapError::CommandFailed {
                command: "docker --version".to_string(),
                detail: "runtime still unavailable after installation".to_string(),
            })
        }
    }
}

async fn runtime_present() -> bool {
    Command::new("docker")
        .arg("--version")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn run_shell(script: &str) -> Result<()> {
    let output = Command::new("sh").arg("-c").arg(script).output().await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(BootstrapError::CommandFailed {
            command: "sh -c <install script>".to_string(),
            detail: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
