//! `dock`: operator-facing CLI, plus two hidden commands (`control`,
//! `orchestrate`) spawned automatically into multiplexer tabs rather than
//! run directly.
//!
//! Every mutating subcommand ensures a control plane is running for the
//! project before it touches the durable store (C8) -- the dispatcher is
//! the only component that schedules and drains retriable work, so a CLI
//! invocation with nothing listening would just leave rows pending
//! forever.

mod collaborators;
mod commands;
mod config;
mod runtime;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dockmaster_core::ensure::{self, SystemProcessScanner};

use collaborators::TmuxMultiplexer;
use commands::work::{WorkArgs, WorkCommands};
use config::DockmasterConfig;

#[derive(Parser)]
#[command(name = "dock", about = "Control plane for autonomous coding agent fleets")]
struct Cli {
    /// Project root (defaults to the current directory, or an ancestor
    /// containing a `.co/` directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane (C4). Spawned automatically; not meant to be
    /// invoked directly by an operator.
    #[command(hide = true)]
    Control,
    /// Run the per-work orchestrator (C7) once to completion. Spawned
    /// automatically by the `spawn-orchestrator` handler.
    #[command(hide = true)]
    Orchestrate {
        #[arg(long)]
        work: String,
    },
    /// Work lifecycle commands.
    Work(WorkArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = DockmasterConfig::resolve(cli.root.as_deref())?;

    match cli.command {
        Commands::Control => commands::control::run(&config).await,
        Commands::Orchestrate { work } => commands::orchestrate::run(&config, &work).await,
        Commands::Work(args) => {
            if !matches!(&args.command, WorkCommands::Create { .. }) {
                config::require_initialized(&config)?;
            }
            ensure_control_plane(&config).await?;
            let ctx = runtime::build_context(&config).await?;
            commands::work::run(&ctx, &config, args.command).await
        }
    }
}

/// Make sure a control-plane process is running for this project before any
/// Work command mutates the durable store (C8).
async fn ensure_control_plane(config: &DockmasterConfig) -> Result<()> {
    let scanner = SystemProcessScanner;
    let multiplexer = TmuxMultiplexer::new();
    ensure::ensure_control_plane(&scanner, &multiplexer, &config.project_root, "dock")
        .await
        .context("failed to ensure the control plane is running")?;
    Ok(())
}
