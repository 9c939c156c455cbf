//! `holdfast target` - build the host handoff record

use colored::Colorize;
use holdfast_deploy::DeploymentTarget;
use std::path::Path;

pub async fn handle(
    resource: &str,
    domain: &str,
    image: &str,
    env: &[String],
    credentials: &[String],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut target = DeploymentTarget::new(resource, domain, image);
    for (key, value) in super::parse_pairs(env)? {
        target = target.with_env(key, value);
    }
    for (key, value) in super::parse_pairs(credentials)? {
        target = target.with_credential(key, value);
    }

    match output {
        Some(path) => {
            target.save(path).await?;
            println!(
                "{} wrote deployment target for '{}' to {}",
                "✓".green(),
                resource.cyan(),
                path.display()
            );
        }
        None => {
            println!("{}", target.to_json()?);
        }
    }
    Ok(())
}
