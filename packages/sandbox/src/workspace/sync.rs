// ABOUTME: Workspace upload/download between a local directory and a remote sandbox
// ABOUTME: Supports direct multipart upload, signed-URL archive transfer and streamed read-back

use super::archive::{self, ArchiveError, WorkspaceFile};
use crate::client::{build_http_client, check_status, read_json, ApiEndpoint, ClientError};
use crate::names::GROUPED_RESOURCE_TYPE;
use futures::StreamExt;
use harness_config::SandboxConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Remote error: {0}")]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Client(err.into())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// How workspace contents reach the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStrategy {
    /// One multipart POST carrying every file plus a `paths` manifest.
    Multipart,
    /// Archive PUT to a signed URL, then an initialize call.
    SignedUrl,
}

/// How workspace contents come back from the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStrategy {
    /// The dump endpoint streams the archive itself.
    Direct,
    /// The dump endpoint returns a signed URL that streams the archive.
    SignedUrl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStrategy {
    pub upload: UploadStrategy,
    pub download: DownloadStrategy,
}

impl SyncStrategy {
    pub const DIRECT: SyncStrategy = SyncStrategy {
        upload: UploadStrategy::Multipart,
        download: DownloadStrategy::Direct,
    };

    pub const SIGNED_URL: SyncStrategy = SyncStrategy {
        upload: UploadStrategy::SignedUrl,
        download: DownloadStrategy::SignedUrl,
    };

    /// `local_dev` workspaces can be large and go through signed URLs;
    /// everything else uses direct transfer.
    pub fn for_resource_type(resource_type: &str) -> Self {
        if resource_type == GROUPED_RESOURCE_TYPE {
            Self::SIGNED_URL
        } else {
            Self::DIRECT
        }
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UploadOutcome {
    /// Nothing to send; no remote call was made.
    Idle { sandbox_id: String, message: String },
    /// The sandbox accepted and extracted the workspace.
    Initialized {
        sandbox_id: String,
        files: usize,
        bytes: u64,
        response: Value,
    },
}

impl UploadOutcome {
    pub fn is_idle(&self) -> bool {
        matches!(self, UploadOutcome::Idle { .. })
    }
}

#[derive(Debug, Deserialize)]
struct UploadUrlResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct DumpUrlResponse {
    download_url: String,
}

/// Moves workspace trees to and from sandboxes of one resource kind.
pub struct WorkspaceSync {
    http: Client,
    endpoint: ApiEndpoint,
    resource_type: String,
    strategy: SyncStrategy,
    timeout: Duration,
}

impl WorkspaceSync {
    /// Sync client for `local_dev` sandboxes.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        Self::for_resource_type(config, GROUPED_RESOURCE_TYPE)
    }

    pub fn for_resource_type(config: &SandboxConfig, resource_type: &str) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            endpoint: ApiEndpoint::from_config(config)?,
            resource_type: resource_type.to_string(),
            strategy: SyncStrategy::for_resource_type(resource_type),
            timeout: config.transfer_timeout,
        })
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SyncStrategy {
        self.strategy
    }

    /// Upload every file under `directory` into the sandbox.
    ///
    /// All-or-nothing: the first failing step aborts the upload. An empty
    /// directory yields [`UploadOutcome::Idle`] without contacting the service.
    pub async fn upload_workspace(
        &self,
        sandbox_id: &str,
        directory: &Path,
    ) -> Result<UploadOutcome> {
        if !directory.is_dir() {
            return Err(SyncError::NotADirectory(directory.to_path_buf()));
        }

        let root = directory.to_path_buf();
        let files = tokio::task::spawn_blocking(move || archive::collect_files(&root))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;

        if files.is_empty() {
            info!(sandbox_id, dir = %directory.display(), "No files to upload");
            return Ok(UploadOutcome::Idle {
                sandbox_id: sandbox_id.to_string(),
                message: "No files to upload".to_string(),
            });
        }

        match self.strategy.upload {
            UploadStrategy::Multipart => self.upload_multipart(sandbox_id, &files).await,
            UploadStrategy::SignedUrl => {
                let count = files.len();
                let content = tokio::task::spawn_blocking(move || archive::build_archive(&files))
                    .await
                    .map_err(|e| SyncError::Task(e.to_string()))??;
                self.transfer_signed(sandbox_id, content, count).await
            }
        }
    }

    /// Upload a pre-built `.tar.gz` through the signed-URL flow.
    pub async fn upload_tarball(&self, sandbox_id: &str, tarball: &Path) -> Result<UploadOutcome> {
        let content = tokio::fs::read(tarball).await?;
        if content.is_empty() {
            info!(sandbox_id, tarball = %tarball.display(), "Empty tarball, nothing to upload");
            return Ok(UploadOutcome::Idle {
                sandbox_id: sandbox_id.to_string(),
                message: "Empty tarball".to_string(),
            });
        }

        self.transfer_signed(sandbox_id, content, 0).await
    }

    async fn upload_multipart(
        &self,
        sandbox_id: &str,
        files: &[WorkspaceFile],
    ) -> Result<UploadOutcome> {
        let paths: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        // Part filenames carry nested paths verbatim; the default encoding would escape '/'.
        let mut form = Form::new()
            .percent_encode_noop()
            .text("paths", serde_json::to_string(&paths)?);

        let mut total: u64 = 0;
        for file in files {
            let data = tokio::fs::read(&file.absolute_path).await?;
            total += data.len() as u64;
            form = form.part(
                "files",
                Part::bytes(data).file_name(file.relative_path.clone()),
            );
        }

        let url = self
            .endpoint
            .sandbox_url(&[self.resource_type.as_str(), sandbox_id, "upload"]);
        info!(sandbox_id, files = files.len(), bytes = total, "Uploading workspace (multipart)");

        let response = self
            .endpoint
            .authorize(self.http.post(url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;
        let response = read_json(check_status(response).await?).await?;

        Ok(UploadOutcome::Initialized {
            sandbox_id: sandbox_id.to_string(),
            files: files.len(),
            bytes: total,
            response,
        })
    }

    /// upload-url -> PUT archive -> initialize.
    async fn transfer_signed(
        &self,
        sandbox_id: &str,
        content: Vec<u8>,
        files: usize,
    ) -> Result<UploadOutcome> {
        let bytes = content.len() as u64;

        let url = self
            .endpoint
            .sandbox_url(&[self.resource_type.as_str(), sandbox_id, "upload-url"]);
        let response = self
            .endpoint
            .authorize(self.http.post(url))
            .timeout(self.timeout)
            .send()
            .await?;
        let signed: UploadUrlResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        debug!(sandbox_id, "Obtained signed upload URL");

        // The signed URL carries its own authorization.
        let response = self
            .http
            .put(&signed.upload_url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/gzip")
            .body(content)
            .send()
            .await?;
        check_status(response).await?;
        info!(sandbox_id, bytes, "Uploaded workspace archive");

        let url = self
            .endpoint
            .sandbox_url(&[self.resource_type.as_str(), sandbox_id, "initialize"]);
        let response = self
            .endpoint
            .authorize(self.http.post(url))
            .timeout(self.timeout)
            .send()
            .await?;
        let response = read_json(check_status(response).await?).await?;
        info!(sandbox_id, "Sandbox workspace initialized");

        Ok(UploadOutcome::Initialized {
            sandbox_id: sandbox_id.to_string(),
            files,
            bytes,
            response,
        })
    }

    /// Download the sandbox workspace into `directory`, creating it if absent.
    /// Returns the number of archive entries written.
    pub async fn download_workspace(&self, sandbox_id: &str, directory: &Path) -> Result<usize> {
        tokio::fs::create_dir_all(directory).await?;

        let dump_url = self
            .endpoint
            .sandbox_url(&[self.resource_type.as_str(), sandbox_id, "dump"]);
        let dump = self
            .endpoint
            .authorize(self.http.get(dump_url))
            .timeout(self.timeout)
            .send()
            .await?;
        let dump = check_status(dump).await?;

        let archive_response = match self.strategy.download {
            DownloadStrategy::Direct => dump,
            DownloadStrategy::SignedUrl => {
                let signed: DumpUrlResponse = dump
                    .json()
                    .await
                    .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
                debug!(sandbox_id, "Obtained signed download URL");
                let response = self
                    .http
                    .get(&signed.download_url)
                    .timeout(self.timeout)
                    .send()
                    .await?;
                check_status(response).await?
            }
        };

        let content = collect_body(archive_response).await?;
        info!(sandbox_id, bytes = content.len(), "Downloaded workspace archive");

        let dest = directory.to_path_buf();
        let written = tokio::task::spawn_blocking(move || archive::extract_archive(&content, &dest))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))??;

        info!(sandbox_id, entries = written, dir = %directory.display(), "Workspace extracted");
        Ok(written)
    }
}

async fn collect_body(response: Response) -> Result<Vec<u8>> {
    let mut stream = response.bytes_stream();
    let mut buf = Vec::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf)
}
