//! Deterministic configuration materialization
//!
//! Renders the deployment target into the files the workload consumes. The
//! same target always produces byte-identical output and existing files are
//! overwritten in place, so repeated runs converge instead of accumulating.

use crate::error::Result;
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use holdfast_deploy::DeploymentTarget;
use tokio::fs;

const ENV_FILE: &str = "workload.env";
const TARGET_FILE: &str = "target.json";
const CREDENTIALS_FILE: &str = "credentials.env";

/// Pipeline step 2: materialize configuration files
pub struct ConfigMaterialize;

#[async_trait::async_trait]
impl BootstrapStep for ConfigMaterialize {
    fn name(&self) -> &str {
        "config-materialize"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome> {
        fs::create_dir_all(&ctx.config_dir).await?;

        fs::write(ctx.config_dir.join(ENV_FILE), render_env(&ctx.target)).await?;
        fs::write(ctx.config_dir.join(TARGET_FILE), render_target(&ctx.target)?).await?;

        let credentials_path = ctx.config_dir.join(CREDENTIALS_FILE);
        fs::write(&credentials_path, render_credentials(&ctx.target)).await?;
        restrict_permissions(&credentials_path).await?;

        tracing::info!(
            "Materialized configuration for '{}' into {}",
            ctx.target.resource_id,
            ctx.config_dir.display()
        );
        Ok(StepOutcome::Completed)
    }
}

/// Sorted KEY=value lines; BTreeMap iteration keeps the order stable
fn render_env(target: &DeploymentTarget) -> String {
    let mut out = String::new();
    out.push_str(&format!("HOLDFAST_DOMAIN={}\n", target.domain));
    out.push_str(&format!("HOLDFAST_IMAGE={}\n", target.image));
    for (key, value) in &target.env {
        out.push_str(&format!("{}={}\n", key, value));
    }
    out
}

/// The handoff record itself, minus credential material
fn render_target(target: &DeploymentTarget) -> Result<String> {
    let mut public = target.clone();
    public.credentials.clear();
    Ok(serde_json::to_string_pretty(&public)?)
}

fn render_credentials(target: &DeploymentTarget) -> String {
    let mut out = String::new();
    for (key, value) in &target.credentials {
        out.push_str(&format!("{}={}\n", key, value));
    }
    out
}

#[cfg(unix)]
async fn restrict_permissions(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &std::path::Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn target() -> DeploymentTarget {
        DeploymentTarget::new("web-prod", "app.example.com", "ghcr.io/acme/app:1.4")
            .with_env("RUST_LOG", "info")
            .with_env("APP_PORT", "8080")
            .with_credential("REGISTRY_TOKEN", "t0ken")
    }

    #[tokio::test]
    async fn test_materialize_writes_expected_files() {
        let dir = tempdir().unwrap();
        let ctx = StepContext::new(target(), dir.path());

        ConfigMaterialize.run(&ctx).await.unwrap();

        let env = std::fs::read_to_string(ctx.config_dir.join(ENV_FILE)).unwrap();
        assert!(env.contains("HOLDFAST_DOMAIN=app.example.com"));
        assert!(env.contains("APP_PORT=8080"));

        let public = std::fs::read_to_string(ctx.config_dir.join(TARGET_FILE)).unwrap();
        assert!(!public.contains("t0ken"));

        let creds = std::fs::read_to_string(ctx.config_dir.join(CREDENTIALS_FILE)).unwrap();
        assert!(creds.contains("REGISTRY_TOKEN=t0ken"));
    }

    #[tokio::test]
    async fn test_rerun_converges_not_accumulates() {
        let dir = tempdir().unwrap();
        let ctx = StepContext::new(target(), dir.path());

        ConfigMaterialize.run(&ctx).await.unwrap();
        let first = std::fs::read_to_string(ctx.config_dir.join(ENV_FILE)).unwrap();

        ConfigMaterialize.run(&ctx).await.unwrap();
        let second = std::fs::read_to_string(ctx.config_dir.join(ENV_FILE)).unwrap();

        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_credentials_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let ctx = StepContext::new(target(), dir.path());
        ConfigMaterialize.run(&ctx).await.unwrap();

        let mode = std::fs::metadata(ctx.config_dir.join(CREDENTIALS_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
