// ABOUTME: Sandbox harness configuration loaded from the process environment
// ABOUTME: Validates the bearer credential, endpoint, timeouts and parallelism up front

pub mod constants;

use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use constants::*;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingCredential(&'static str),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Settings shared by the resource client, the manager and workspace sync.
#[derive(Clone)]
pub struct SandboxConfig {
    pub api_key: String,
    pub api_base: String,
    pub benchmark_tag: String,
    pub acquire_timeout: Duration,
    pub release_timeout: Duration,
    pub transfer_timeout: Duration,
    pub max_concurrency: usize,
}

// Keep the credential out of logs.
impl fmt::Debug for SandboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("benchmark_tag", &self.benchmark_tag)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("release_timeout", &self.release_timeout)
            .field("transfer_timeout", &self.transfer_timeout)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl SandboxConfig {
    /// Build a config with default endpoint, tag and timeouts.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential(KLAVIS_API_KEY));
        }

        Ok(Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            benchmark_tag: DEFAULT_BENCHMARK_TAG.to_string(),
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            release_timeout: Duration::from_secs(DEFAULT_RELEASE_TIMEOUT_SECS),
            transfer_timeout: Duration::from_secs(DEFAULT_TRANSFER_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        })
    }

    /// Read the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(KLAVIS_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(KLAVIS_API_KEY))?;

        let mut config = Self::new(api_key)?;

        if let Some(base) = lookup(KLAVIS_API_BASE).filter(|b| !b.trim().is_empty()) {
            config.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(tag) = lookup(SANDBOX_BENCHMARK_TAG).filter(|t| !t.trim().is_empty()) {
            config.benchmark_tag = tag;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, SANDBOX_ACQUIRE_TIMEOUT_SECS)? {
            config.acquire_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, SANDBOX_RELEASE_TIMEOUT_SECS)? {
            config.release_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, SANDBOX_TRANSFER_TIMEOUT_SECS)? {
            config.transfer_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_var::<usize>(&lookup, SANDBOX_MAX_CONCURRENCY)? {
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    name: SANDBOX_MAX_CONCURRENCY,
                    value: n.to_string(),
                });
            }
            config.max_concurrency = n;
        }

        debug!("Loaded sandbox configuration: {:?}", config);
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_benchmark_tag(mut self, tag: impl Into<String>) -> Self {
        self.benchmark_tag = tag.into();
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_timeouts(
        mut self,
        acquire: Duration,
        release: Duration,
        transfer: Duration,
    ) -> Self {
        self.acquire_timeout = acquire;
        self.release_timeout = release;
        self.transfer_timeout = transfer;
        self
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>> {
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_credential_is_an_error() {
        let result = SandboxConfig::from_lookup(lookup_from(&[]));
        assert_eq!(result.unwrap_err(), ConfigError::MissingCredential(KLAVIS_API_KEY));

        let blank = SandboxConfig::from_lookup(lookup_from(&[(KLAVIS_API_KEY, "  ")]));
        assert!(blank.is_err());
    }

    #[test]
    fn test_defaults_applied() {
        let config = SandboxConfig::from_lookup(lookup_from(&[(KLAVIS_API_KEY, "k")])).unwrap();
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.benchmark_tag, "MCP_Atlas");
        assert_eq!(config.acquire_timeout, Duration::from_secs(60));
        assert_eq!(config.release_timeout, Duration::from_secs(30));
        assert_eq!(config.transfer_timeout, Duration::from_secs(120));
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_overrides_and_trailing_slash() {
        let config = SandboxConfig::from_lookup(lookup_from(&[
            (KLAVIS_API_KEY, "k"),
            (KLAVIS_API_BASE, "http://localhost:9000/"),
            (SANDBOX_BENCHMARK_TAG, "Toolathlon"),
            (SANDBOX_ACQUIRE_TIMEOUT_SECS, "5"),
            (SANDBOX_MAX_CONCURRENCY, "8"),
        ]))
        .unwrap();

        assert_eq!(config.api_base, "http://localhost:9000");
        assert_eq!(config.benchmark_tag, "Toolathlon");
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.max_concurrency, 8);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let result = SandboxConfig::from_lookup(lookup_from(&[
            (KLAVIS_API_KEY, "k"),
            (SANDBOX_RELEASE_TIMEOUT_SECS, "soon"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: SANDBOX_RELEASE_TIMEOUT_SECS, .. })
        ));

        let zero = SandboxConfig::from_lookup(lookup_from(&[
            (KLAVIS_API_KEY, "k"),
            (SANDBOX_MAX_CONCURRENCY, "0"),
        ]));
        assert!(zero.is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = SandboxConfig::new("super-secret").unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        env::set_var(KLAVIS_API_KEY, "env-key");
        env::set_var(SANDBOX_BENCHMARK_TAG, "EnvTag");
        let config = SandboxConfig::from_env().unwrap();
        env::remove_var(KLAVIS_API_KEY);
        env::remove_var(SANDBOX_BENCHMARK_TAG);

        assert_eq!(config.api_key, "env-key");
        assert_eq!(config.benchmark_tag, "EnvTag");
    }
}
