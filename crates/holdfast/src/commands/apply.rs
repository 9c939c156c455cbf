//! `holdfast apply` - locked state mutation

use colored::Colorize;
use holdfast_deploy::{ApplyOptions, RetryConfig};
use std::path::Path;
use std::time::Duration;

pub async fn handle(
    state_dir: &Path,
    resource: &str,
    file: &Path,
    lock_timeout: u64,
) -> anyhow::Result<()> {
    let payload = tokio::fs::read(file).await?;
    let coordinator = super::open_coordinator(state_dir)?.with_options(ApplyOptions {
        lock_ttl: Duration::from_secs(60),
        lock_timeout: Duration::from_secs(lock_timeout),
        io_retry: RetryConfig::default(),
    });

    match coordinator
        .apply(resource, move |_current| Ok(payload))
        .await
    {
        Ok(blob) => {
            println!(
                "{} applied '{}' version {} ({} bytes)",
                "✓".green(),
                resource.cyan(),
                blob.version,
                blob.payload.len()
            );
            Ok(())
        }
        Err(e) if e.is_recoverable() => {
            eprintln!(
                "{} {}",
                "Recoverable:".yellow().bold(),
                "another run is mutating this resource; re-run this command to retry".yellow()
            );
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}
