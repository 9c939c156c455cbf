mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "holdfast")]
#[command(about = "Locked, versioned infrastructure state with idempotent host bootstrap", long_about = None)]
struct Cli {
    /// State root directory (object store + lock records)
    #[arg(long, env = "HOLDFAST_STATE_DIR", default_value = ".holdfast", global = true)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a new state payload to a resource (locked compare-and-swap)
    Apply {
        /// Resource to mutate (e.g. net-sg, web-prod)
        resource: String,
        /// File containing the new opaque payload
        #[arg(short, long)]
        file: PathBuf,
        /// Seconds to wait for a contended lock
        #[arg(long, default_value = "30")]
        lock_timeout: u64,
    },
    /// Show the latest (or a historical) state of a resource
    Show {
        /// Resource to read
        resource: String,
        /// Specific version instead of the latest
        #[arg(short, long)]
        version: Option<u64>,
    },
    /// List the version history of a resource
    Versions {
        /// Resource to list
        resource: String,
    },
    /// Build a deployment target record for host handoff
    Target {
        /// Resource the target derives from
        resource: String,
        /// Public domain the workload serves
        #[arg(long)]
        domain: String,
        /// Workload container image reference
        #[arg(long)]
        image: String,
        /// Environment entries as KEY=VALUE (repeatable)
        #[arg(short, long)]
        env: Vec<String>,
        /// Credential entries as KEY=VALUE (repeatable)
        #[arg(long)]
        credential: Vec<String>,
        /// Write the target JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run (or resume) the bootstrap sequence on this host
    Bootstrap {
        /// Deployment target JSON produced by `holdfast target`
        #[arg(short, long)]
        target: PathBuf,
        /// Host-local directory for checkpoints and materialized config
        #[arg(long, default_value = "/var/lib/holdfast")]
        host_dir: PathBuf,
        /// Package tooling of this host: apt, dnf or get-docker
        #[arg(long, default_value = "get-docker")]
        package_manager: String,
        /// Retry budget per step before the sequence fails fatally
        #[arg(long, default_value = "3")]
        max_attempts: u32,
        /// Seconds to wait for the target domain to resolve
        #[arg(long, default_value = "120")]
        dns_timeout: u64,
    },
    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt::init();

    match cli.command {
        Commands::Apply {
            resource,
            file,
            lock_timeout,
        } => {
            commands::apply::handle(&cli.state_dir, &resource, &file, lock_timeout).await?;
        }
        Commands::Show { resource, version } => {
            commands::show::handle(&cli.state_dir, &resource, version).await?;
        }
        Commands::Versions { resource } => {
            commands::versions::handle(&cli.state_dir, &resource).await?;
        }
        Commands::Target {
            resource,
            domain,
            image,
            env,
            credential,
            output,
        } => {
            commands::target::handle(&resource, &domain, &image, &env, &credential, output.as_deref())
                .await?;
        }
        Commands::Bootstrap {
            target,
            host_dir,
            package_manager,
            max_attempts,
            dns_timeout,
        } => {
            commands::bootstrap::handle(
                &target,
                &host_dir,
                &package_manager,
                max_attempts,
                dns_timeout,
            )
            .await?;
        }
        Commands::Version => {
            println!("holdfast {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
