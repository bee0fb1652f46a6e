// ABOUTME: CLI commands for moving workspace trees to and from a sandbox
// ABOUTME: Upload accepts a directory or a prebuilt tarball; download falls back to the evaluation hand-off id

use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use colored::*;
use harness_config::constants::TOOLATHLON_LOCAL_DEV_SANDBOX_ID;
use harness_config::SandboxConfig;
use harness_sandbox::{
    DownloadStrategy, SyncStrategy, UploadOutcome, UploadStrategy, WorkspaceSync,
    GROUPED_RESOURCE_TYPE,
};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum UploadMode {
    /// Archive PUT to a signed URL, then initialize
    Signed,
    /// Single multipart POST
    Multipart,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DownloadMode {
    /// Dump endpoint returns a signed URL
    Signed,
    /// Dump endpoint streams the archive
    Direct,
}

#[derive(Subcommand)]
pub enum WorkspaceCommands {
    /// Upload a workspace into a sandbox
    Upload {
        /// Target sandbox id
        #[arg(long)]
        sandbox_id: String,

        /// Directory whose files are uploaded
        #[arg(long, conflicts_with = "tarball", required_unless_present = "tarball")]
        dir: Option<PathBuf>,

        /// Prebuilt gzip tarball to upload as-is (signed transfer only)
        #[arg(long)]
        tarball: Option<PathBuf>,

        /// Resource kind of the sandbox
        #[arg(long, default_value = GROUPED_RESOURCE_TYPE)]
        resource_type: String,

        /// Transfer mode (default depends on the resource kind)
        #[arg(long, value_enum)]
        strategy: Option<UploadMode>,
    },

    /// Download a sandbox workspace into a local directory
    Download {
        /// Source sandbox id (defaults to $TOOLATHLON_LOCAL_DEV_SANDBOX_ID)
        #[arg(long)]
        sandbox_id: Option<String>,

        /// Destination directory, created if missing
        #[arg(long)]
        dir: PathBuf,

        /// Resource kind of the sandbox
        #[arg(long, default_value = GROUPED_RESOURCE_TYPE)]
        resource_type: String,

        /// Transfer mode (default depends on the resource kind)
        #[arg(long, value_enum)]
        strategy: Option<DownloadMode>,
    },
}

impl WorkspaceCommands {
    pub async fn execute(self, config: &SandboxConfig) -> Result<()> {
        match self {
            WorkspaceCommands::Upload {
                sandbox_id,
                dir,
                tarball,
                resource_type,
                strategy,
            } => {
                let mut sync = WorkspaceSync::for_resource_type(config, &resource_type)?;
                if let Some(mode) = strategy {
                    let new_strategy = with_upload(sync.strategy(), mode);
                    sync = sync.with_strategy(new_strategy);
                }
                upload_command(&sync, &sandbox_id, dir, tarball).await
            }
            WorkspaceCommands::Download {
                sandbox_id,
                dir,
                resource_type,
                strategy,
            } => {
                let sandbox_id = resolve_sandbox_id(sandbox_id, |name| std::env::var(name).ok())?;
                let mut sync = WorkspaceSync::for_resource_type(config, &resource_type)?;
                if let Some(mode) = strategy {
                    let new_strategy = with_download(sync.strategy(), mode);
                    sync = sync.with_strategy(new_strategy);
                }
                let written = sync
                    .download_workspace(&sandbox_id, &dir)
                    .await
                    .with_context(|| format!("Failed to download workspace of {}", sandbox_id))?;
                println!(
                    "{} {} entries into {}",
                    "Downloaded".green().bold(),
                    written,
                    dir.display()
                );
                Ok(())
            }
        }
    }
}

async fn upload_command(
    sync: &WorkspaceSync,
    sandbox_id: &str,
    dir: Option<PathBuf>,
    tarball: Option<PathBuf>,
) -> Result<()> {
    let outcome = match (dir, tarball) {
        (Some(dir), _) => sync.upload_workspace(sandbox_id, &dir).await,
        (None, Some(tarball)) => {
            if sync.strategy().upload != UploadStrategy::SignedUrl {
                bail!("--tarball requires the signed upload strategy");
            }
            sync.upload_tarball(sandbox_id, &tarball).await
        }
        (None, None) => bail!("either --dir or --tarball is required"),
    }
    .with_context(|| format!("Failed to upload workspace to {}", sandbox_id))?;

    match &outcome {
        UploadOutcome::Idle { message, .. } => {
            eprintln!("{} {}", "Nothing uploaded:".yellow().bold(), message)
        }
        UploadOutcome::Initialized { files, bytes, .. } => eprintln!(
            "{} {} files ({} bytes)",
            "Uploaded".green().bold(),
            files,
            bytes
        ),
    }
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn with_upload(current: SyncStrategy, mode: UploadMode) -> SyncStrategy {
    let upload = match mode {
        UploadMode::Signed => UploadStrategy::SignedUrl,
        UploadMode::Multipart => UploadStrategy::Multipart,
    };
    SyncStrategy { upload, ..current }
}

fn with_download(current: SyncStrategy, mode: DownloadMode) -> SyncStrategy {
    let download = match mode {
        DownloadMode::Signed => DownloadStrategy::SignedUrl,
        DownloadMode::Direct => DownloadStrategy::Direct,
    };
    SyncStrategy { download, ..current }
}

fn resolve_sandbox_id<F>(explicit: Option<String>, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    explicit
        .or_else(|| lookup(TOOLATHLON_LOCAL_DEV_SANDBOX_ID))
        .filter(|id| !id.trim().is_empty())
        .with_context(|| {
            format!(
                "--sandbox-id not given and {} is not set",
                TOOLATHLON_LOCAL_DEV_SANDBOX_ID
            )
        })
}
