mod commands;
mod utils;

use clap::{Parser, Subcommand};
use commands::{RunArgs, run_session};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capsule")]
#[command(about = "Run containers in their own lightweight VM")]
struct Cli {
    /// Supervisor configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a VM for a container and run it in the foreground
    Run(RunArgs),
    /// Remove the on-disk state of a session
    Clean {
        /// Container ID
        id: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = utils::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            run_session(config, args).await?;
        }
        Commands::Clean { id } => {
            let supervisor = capsule_shim::Supervisor::new(config).await?;
            supervisor.clean(&id).await?;
            println!("{}", id);
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
