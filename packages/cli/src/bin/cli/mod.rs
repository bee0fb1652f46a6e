pub mod sandbox;
pub mod workspace;

use anyhow::{Context, Result};
use harness_config::SandboxConfig;

/// Environment-backed configuration, with an optional base URL override from the command line.
pub fn load_config(api_base: Option<&str>) -> Result<SandboxConfig> {
    let config = SandboxConfig::from_env().context("Failed to load sandbox configuration")?;
    Ok(match api_base {
        Some(base) => config.with_api_base(base),
        None => config,
    })
}
