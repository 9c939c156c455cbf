pub mod apply;
pub mod bootstrap;
pub mod show;
pub mod target;
pub mod versions;

use anyhow::Context;
use holdfast_deploy::StateCoordinator;
use holdfast_lock::LockManager;
use holdfast_store::{Cipher, DirStore, ObjectStore};
use std::path::Path;
use std::sync::Arc;

const KEY_ENV: &str = "HOLDFAST_KEY";

/// Resolve the payload cipher from the environment
pub fn cipher_from_env() -> anyhow::Result<Cipher> {
    let encoded = std::env::var(KEY_ENV).with_context(|| {
        format!(
            "{} is not set\n\nHint:\n  • export a base64-encoded 32-byte key, e.g.:\n    export {}=$(head -c 32 /dev/urandom | base64)",
            KEY_ENV, KEY_ENV
        )
    })?;
    Ok(Cipher::from_base64(&encoded)?)
}

/// Open the object store rooted under the state directory
pub fn open_store(state_dir: &Path) -> anyhow::Result<Arc<dyn ObjectStore>> {
    Ok(Arc::new(DirStore::new(
        state_dir.join("state"),
        cipher_from_env()?,
    )))
}

/// Build a coordinator over the shared state directory
pub fn open_coordinator(state_dir: &Path) -> anyhow::Result<StateCoordinator> {
    let store = open_store(state_dir)?;
    let locks = LockManager::new(state_dir.join("locks"));
    Ok(StateCoordinator::new(store, locks))
}

/// Parse repeatable KEY=VALUE arguments
pub fn parse_pairs(pairs: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .with_context(|| format!("'{}' is not KEY=VALUE", pair))
        })
        .collect()
}
