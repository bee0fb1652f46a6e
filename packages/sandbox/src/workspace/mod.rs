// ABOUTME: Workspace archive sync between local directories and remote sandboxes
// ABOUTME: Re-exports archive helpers and the upload/download client

pub mod archive;
pub mod sync;

pub use archive::{ArchiveError, WorkspaceFile};
pub use sync::{
    DownloadStrategy, SyncError, SyncStrategy, UploadOutcome, UploadStrategy, WorkspaceSync,
};
