//! Workload startup through the local container engine
//!
//! The engine is a black box behind its local socket: pull the declared
//! image, replace any previous instance of the workload container, start
//! the new one. Certificate storage and configuration are already in place
//! by the time this step runs.

// Bollard 0.19 still ships the workable container Config API as deprecated
#![allow(deprecated)]

use crate::error::{BootstrapError, Result};
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use bollard::Docker;
use bollard::container::{Config, CreateContainerOptions};
use bollard::models::{HostConfig, RestartPolicy, RestartPolicyNameEnum};
use futures_util::StreamExt;

/// Pipeline step 5: start the declared workload
pub struct WorkloadStart;

#[async_trait::async_trait]
impl BootstrapStep for WorkloadStart {
    fn name(&self) -> &str {
        "workload-start"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome> {
        let docker = Docker::connect_with_local_defaults()?;
        let name = container_name(&ctx.target.resource_id);

        pull_image(&docker, &ctx.target.image).await?;
        remove_existing(&docker, &name).await?;

        let env: Vec<String> = std::iter::once(format!("HOLDFAST_DOMAIN={}", ctx.target.domain))
            .chain(ctx.target.env.iter().map(|(k, v)| format!("{}={}", k, v)))
            .collect();

        let config = Config {
            image: Some(ctx.target.image.clone()),
            env: Some(env),
            host_config: Some(HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: None,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: name.clone(),
            platform: None,
        };

        docker.create_container(Some(options), config).await?;
        docker
            .start_container(
                &name,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await?;

        tracing::info!("Started workload '{}' from {}", name, ctx.target.image);
        Ok(StepOutcome::Completed)
    }
}

fn container_name(resource_id: &str) -> String {
    format!("holdfast-{}", resource_id)
}

async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    let (from_image, tag) = match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    };

    let options = bollard::image::CreateImageOptions {
        from_image,
        tag,
        ..Default::default()
    };
    let mut stream =
        docker.create_image(Some(options), None, None::<bollard::auth::DockerCredentials>);
    while let Some(info) = stream.next().await {
        match info {
            Ok(progress) => {
                if let Some(status) = progress.status {
                    tracing::debug!("Pulling {}: {}", image, status);
                }
            }
            Err(e) => {
                return Err(BootstrapError::ContainerEngine(format!(
                    "failed to pull '{}': {}",
                    image, e
                )));
            }
        }
    }
    Ok(())
}

/// Stop and remove a previous instance of the workload, if any
async fn remove_existing(docker: &Docker, name: &str) -> Result<()> {
    match docker
        .stop_container(name, None::<bollard::query_parameters::StopContainerOptions>)
        .await
    {
        Ok(()) => {}
        // 404: no previous instance; 304: already stopped
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404 | 304,
            ..
        }) => {}
        Err(e) => return Err(e.into()),
    }

    match docker
        .remove_container(
            name,
            None::<bollard::query_parameters::RemoveContainerOptions>,
        )
        .await
    {
        Ok(()) => {
            tracing::debug!("Removed previous workload container '{}'", name);
        }
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_name_derivation() {
        assert_eq!(container_name("web-prod"), "holdfast-web-prod");
    }
}
