//! `holdfast bootstrap` - run or resume the host convergence sequence

use anyhow::Context;
use colored::Colorize;
use holdfast_bootstrap::{BootstrapError, PackageManager, Sequencer, StepContext};
use holdfast_deploy::{DeploymentTarget, RetryConfig};
use std::path::Path;
use std::time::Duration;

pub async fn handle(
    target_path: &Path,
    host_dir: &Path,
    package_manager: &str,
    max_attempts: u32,
    dns_timeout: u64,
) -> anyhow::Result<()> {
    let target = DeploymentTarget::load(target_path)
        .await
        .with_context(|| format!("failed to load deployment target from {}", target_path.display()))?;
    let package_manager: PackageManager = package_manager
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let ctx = StepContext::new(target, host_dir)
        .with_package_manager(package_manager)
        .with_dns_timeout(Duration::from_secs(dns_timeout));
    let sequencer = Sequencer::standard().with_retry(RetryConfig {
        max_attempts,
        ..RetryConfig::default()
    });

    println!(
        "{} converging '{}' (state in {})",
        "▶".blue(),
        ctx.target.resource_id.cyan().bold(),
        host_dir.display()
    );

    match sequencer.run(&ctx).await {
        Ok(report) => {
            for step in &report.skipped {
                println!("  {} {} (already done)", "•".dimmed(), step.dimmed());
            }
            for step in &report.completed {
                println!("  {} {}", "✓".green(), step);
            }
            for (step, warning) in &report.warnings {
                println!("  {} {}: {}", "⚠".yellow(), step.yellow(), warning);
            }
            println!("{}", "✓ sequence complete".green().bold());
            Ok(())
        }
        Err(e @ BootstrapError::StepFatal { .. }) => {
            eprintln!("{}", "✗ sequence fatal".red().bold());
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
