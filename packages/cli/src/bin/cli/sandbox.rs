// ABOUTME: CLI commands for sandbox lifecycle (acquire, describe, release)
// ABOUTME: Acquire goes through the session manager so grouping and release match a benchmark run

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::*;
use harness_config::SandboxConfig;
use harness_sandbox::{ExtraParams, HttpSandboxClient, SandboxApi, SandboxManager};
use std::collections::HashMap;
use tracing::warn;

#[derive(Subcommand)]
pub enum SandboxCommands {
    /// Acquire sandboxes for logical service names and print the endpoint overrides
    Acquire {
        /// Logical service names (e.g. filesystem terminal emails)
        #[arg(required = true)]
        names: Vec<String>,

        /// Per-name extra parameters as a JSON object, e.g. '{"notion": {"workspace": "demo"}}'
        #[arg(long)]
        params: Option<String>,

        /// Keep the sandboxes until Ctrl-C before releasing them
        #[arg(long)]
        hold: bool,
    },

    /// Show the provisioning service's view of one sandbox
    Describe {
        /// Resource kind the sandbox was acquired as (e.g. local_dev)
        resource_type: String,

        /// Sandbox id
        sandbox_id: String,
    },

    /// Release one sandbox
    Release {
        /// Resource kind the sandbox was acquired as (e.g. local_dev)
        resource_type: String,

        /// Sandbox id
        sandbox_id: String,
    },
}

impl SandboxCommands {
    pub async fn execute(self, config: &SandboxConfig) -> Result<()> {
        match self {
            SandboxCommands::Acquire {
                names,
                params,
                hold,
            } => acquire_command(config, names, params.as_deref(), hold).await,
            SandboxCommands::Describe {
                resource_type,
                sandbox_id,
            } => describe_command(config, &resource_type, &sandbox_id).await,
            SandboxCommands::Release {
                resource_type,
                sandbox_id,
            } => release_command(config, &resource_type, &sandbox_id).await,
        }
    }
}

async fn acquire_command(
    config: &SandboxConfig,
    names: Vec<String>,
    params: Option<&str>,
    hold: bool,
) -> Result<()> {
    let extra = parse_params(params)?;
    let manager = SandboxManager::new(config)?;

    let overrides = manager.acquire_many(&names, &extra).await;
    println!("{}", serde_json::to_string_pretty(&overrides)?);

    let acquired = manager.acquired().await;
    for descriptor in &acquired {
        eprintln!(
            "{} {} {}",
            "Acquired".green().bold(),
            descriptor.resource_type,
            descriptor.id
        );
    }

    if hold && !acquired.is_empty() {
        eprintln!("Holding sandboxes; press Ctrl-C to release");
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C, releasing now: {}", e);
        }
    }

    let summary = manager.release_all().await;
    eprintln!(
        "{} {} released, {} failed",
        "Done:".green().bold(),
        summary.released,
        summary.failed
    );
    Ok(())
}

async fn describe_command(
    config: &SandboxConfig,
    resource_type: &str,
    sandbox_id: &str,
) -> Result<()> {
    let client = HttpSandboxClient::new(config)?;
    let details = client
        .describe(resource_type, sandbox_id)
        .await
        .with_context(|| {
            format!("Failed to describe {} sandbox {}", resource_type, sandbox_id)
        })?;
    println!("{}", serde_json::to_string_pretty(&details)?);
    Ok(())
}

async fn release_command(
    config: &SandboxConfig,
    resource_type: &str,
    sandbox_id: &str,
) -> Result<()> {
    let client = HttpSandboxClient::new(config)?;
    client
        .release(resource_type, sandbox_id)
        .await
        .with_context(|| {
            format!("Failed to release {} sandbox {}", resource_type, sandbox_id)
        })?;
    println!("{} {} {}", "Released".green().bold(), resource_type, sandbox_id);
    Ok(())
}

fn parse_params(raw: Option<&str>) -> Result<HashMap<String, ExtraParams>> {
    let Some(raw) = raw else {
        return Ok(HashMap::new());
    };
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--params must be valid JSON")?;
    let serde_json::Value::Object(map) = value else {
        bail!("--params must be a JSON object keyed by service name");
    };

    map.into_iter()
        .map(|(name, params)| match params {
            serde_json::Value::Object(params) => Ok((name, params)),
            other => bail!("parameters for '{}' must be an object, got {}", name, other),
        })
        .collect()
}
