//! Certificate store initialization
//!
//! Creates the store file the TLS-terminating workload writes its issued
//! certificates into. Strictly create-if-absent: a re-run must never
//! truncate an existing store, or the host would re-issue certificates it
//! already holds.

use crate::error::Result;
use crate::step::{BootstrapStep, StepContext, StepOutcome};
use std::io::ErrorKind;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Pipeline step 3: initialize the certificate store
pub struct CertStoreInit;

#[async_trait::async_trait]
impl BootstrapStep for CertStoreInit {
    fn name(&self) -> &str {
        "cert-store-init"
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome> {
        if let Some(parent) = ctx.cert_store_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&ctx.cert_store_path)
            .await
        {
            Ok(mut file) => {
                file.write_all(b"{}\n").await?;
                file.flush().await?;
                restrict_permissions(&ctx.cert_store_path).await?;
                tracing::info!(
                    "Initialized certificate store at {}",
                    ctx.cert_store_path.display()
                );
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(
                    "Certificate store already exists at {}, leaving it untouched",
                    ctx.cert_store_path.display()
                );
            }
            Err(e) => return Err(e.into()),
        }

        Ok(StepOutcome::Completed)
    }
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
