// ABOUTME: Remote sandbox provisioning for the agent test harness
// ABOUTME: Maps logical service names to remote sandboxes, tracks them for release and syncs workspaces

pub mod client;
pub mod manager;
pub mod names;
pub mod workspace;

pub use client::{
    ClientError, ExtraParams, HttpSandboxClient, SandboxApi, SandboxDescriptor, SandboxDetails,
};
pub use manager::{EndpointOverrides, ManagerError, ReleaseSummary, SandboxManager};
pub use names::{task_dir_to_task_name, NameTable, Partition, GROUPED_RESOURCE_TYPE};
pub use workspace::{
    DownloadStrategy, SyncError, SyncStrategy, UploadOutcome, UploadStrategy, WorkspaceSync,
};

pub use harness_config::{ConfigError, SandboxConfig};
