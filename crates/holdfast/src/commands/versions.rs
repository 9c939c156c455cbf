//! `holdfast versions` - audit history listing

use colored::Colorize;
use holdfast_store::ObjectStore;
use std::path::Path;

pub async fn handle(state_dir: &Path, resource: &str) -> anyhow::Result<()> {
    let store = super::open_store(state_dir)?;
    let versions = store.list_versions(resource).await?;

    if versions.is_empty() {
        println!("resource '{}' has no versions", resource);
        return Ok(());
    }

    println!(
        "{:>8}  {:<12}  {:>6}  {:>8}  {}",
        "VERSION".bold(),
        "CHECKSUM".bold(),
        "FENCE".bold(),
        "SIZE".bold(),
        "WRITTEN".bold()
    );
    for record in versions {
        let fence = record
            .fence_token
            .map(|f| f.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>8}  {:<12}  {:>6}  {:>8}  {}",
            record.version,
            short_checksum(&record.checksum),
            fence,
            record.size,
            record.written_at
        );
    }
    Ok(())
}

/// Abbreviate for the table; a hand-edited record may carry a short one
fn short_checksum(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_checksum_never_panics() {
        assert_eq!(
            short_checksum("0123456789abcdef0123456789abcdef"),
            "0123456789ab"
        );
        assert_eq!(short_checksum("tiny"), "tiny");
        assert_eq!(short_checksum(""), "");
    }
}
