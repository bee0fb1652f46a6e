// ABOUTME: Operator entry point for inspecting and exercising remote harness sandboxes
// ABOUTME: Loads credentials from the environment and dispatches acquire/describe/release/upload/download

use clap::{Parser, Subcommand};
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::sandbox::SandboxCommands;
use cli::workspace::WorkspaceCommands;

#[derive(Parser)]
#[command(name = "sandboxctl")]
#[command(about = "Acquire, inspect and sync remote sandboxes used by the agent test harness")]
#[command(version)]
struct Cli {
    /// Override the provisioning service base URL
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(flatten)]
    Sandbox(SandboxCommands),
    #[command(flatten)]
    Workspace(WorkspaceCommands),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = handle_command(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        process::exit(1);
    }
}

async fn handle_command(cli: Cli) -> anyhow::Result<()> {
    let config = cli::load_config(cli.api_base.as_deref())?;

    match cli.command {
        Commands::Sandbox(cmd) => cmd.execute(&config).await,
        Commands::Workspace(cmd) => cmd.execute(&config).await,
    }
}
