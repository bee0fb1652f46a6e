// ABOUTME: Environment variable name constants
// ABOUTME: Centralized definitions of all environment variable names read by the sandbox harness

// Remote Provisioning Service
pub const KLAVIS_API_KEY: &str = "KLAVIS_API_KEY";
pub const KLAVIS_API_BASE: &str = "KLAVIS_API_BASE";

// Acquisition Request Tagging
pub const SANDBOX_BENCHMARK_TAG: &str = "SANDBOX_BENCHMARK_TAG";

// Timeouts (seconds)
pub const SANDBOX_ACQUIRE_TIMEOUT_SECS: &str = "SANDBOX_ACQUIRE_TIMEOUT_SECS";
pub const SANDBOX_RELEASE_TIMEOUT_SECS: &str = "SANDBOX_RELEASE_TIMEOUT_SECS";
pub const SANDBOX_TRANSFER_TIMEOUT_SECS: &str = "SANDBOX_TRANSFER_TIMEOUT_SECS";

// Parallelism
pub const SANDBOX_MAX_CONCURRENCY: &str = "SANDBOX_MAX_CONCURRENCY";

// Evaluation hand-off: local_dev sandbox whose workspace is read back
pub const TOOLATHLON_LOCAL_DEV_SANDBOX_ID: &str = "TOOLATHLON_LOCAL_DEV_SANDBOX_ID";

// Defaults
pub const DEFAULT_API_BASE: &str = "https://api.klavis.ai";
pub const DEFAULT_BENCHMARK_TAG: &str = "MCP_Atlas";
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RELEASE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_TRANSFER_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
