//! Host-level mutual exclusion for the sequencer
//!
//! A re-invoked sequencer must never race a previous instance that is still
//! alive on the same host. The guard is a pid file claimed with an
//! exclusive create; a guard left behind by a dead process is detected via
//! `/proc` and removed.

use crate::error::{BootstrapError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

/// RAII pid-file guard, removed on drop
#[derive(Debug)]
pub struct RunGuard {
    path: PathBuf,
    released: bool,
}

impl RunGuard {
    /// Claim the guard, failing if a live bootstrap run holds it
    pub async fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        for _ in 0..2 {
            if let Some(guard) = try_claim(&path).await? {
                return Ok(guard);
            }

            let content = fs::read_to_string(&path).await.unwrap_or_default();
            let pid = content.trim().parse::<u32>().unwrap_or(0);
            if pid != 0 && process_alive(pid) {
                return Err(BootstrapError::GuardHeld { pid });
            }

            tracing::warn!("Removing stale bootstrap guard left by pid {}", pid);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // A competing instance re-claimed it between our removal and retry
        Err(BootstrapError::GuardHeld { pid: 0 })
    }

    /// Explicit release; drop does the same best-effort
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            match fs::remove_file(&self.path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.released {
            // Synchronous cleanup in drop - not ideal but necessary
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn try_claim(path: &Path) -> Result<Option<RunGuard>> {
    use tokio::io::AsyncWriteExt;

    match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(mut file) => {
            file.write_all(std::process::id().to_string().as_bytes())
                .await?;
            file.flush().await?;
            Ok(Some(RunGuard {
                path: path.to_path_buf(),
                released: false,
            }))
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Liveness check via the proc filesystem; without one, assume alive
fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if !proc_root.exists() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}
