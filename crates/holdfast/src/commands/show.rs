//! `holdfast show` - lock-free state observation

use anyhow::bail;
use colored::Colorize;
use holdfast_store::{ObjectStore, StateBlob};
use std::path::Path;

pub async fn handle(state_dir: &Path, resource: &str, version: Option<u64>) -> anyhow::Result<()> {
    let store = super::open_store(state_dir)?;

    let blob: StateBlob = match version {
        Some(v) => store.get_version(resource, v).await?,
        None => match store.get(resource).await? {
            Some(blob) => blob,
            None => bail!("resource '{}' has never been written", resource),
        },
    };

    println!("{}", resource.cyan().bold());
    println!("  version:  {}", blob.version);
    println!("  checksum: {}", blob.checksum);
    if let Some(fence) = blob.fence_token {
        println!("  fence:    {}", fence);
    }
    println!("  written:  {}", blob.written_at);
    println!();
    println!("{}", String::from_utf8_lossy(&blob.payload));
    Ok(())
}
