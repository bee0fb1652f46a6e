// ABOUTME: Gzip tar archive helpers for workspace sync
// ABOUTME: Collects workspace files, builds in-memory archives and extracts them without escaping the target

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(String),

    #[error("Archive entry escapes target directory: {0}")]
    PathTraversal(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// A regular file under a workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFile {
    /// Path relative to the root, exactly as on disk. Used as the archive entry name.
    pub relative: PathBuf,
    /// `/`-separated display form of `relative`; lossy for non-UTF-8 names.
    pub relative_path: String,
    pub absolute_path: PathBuf,
}

/// Every regular file below `root`, sorted by relative path. Symlinks are not followed.
pub fn collect_files(root: &Path) -> Result<Vec<WorkspaceFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| ArchiveError::Walk(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ArchiveError::Walk(e.to_string()))?;
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(WorkspaceFile {
            relative: relative.to_path_buf(),
            relative_path,
            absolute_path: entry.path().to_path_buf(),
        });
    }

    files.sort_by(|a, b| {
        a.relative_path
            .cmp(&b.relative_path)
            .then_with(|| a.relative.cmp(&b.relative))
    });
    Ok(files)
}

/// Build a gzip-compressed tar of `files`, keeping relative paths and file metadata.
pub fn build_archive(files: &[WorkspaceFile]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    for file in files {
        builder.append_path_with_name(&file.absolute_path, &file.relative)?;
    }

    let encoder = builder.into_inner()?;
    let bytes = encoder.finish()?;
    debug!(files = files.len(), bytes = bytes.len(), "Built workspace archive");
    Ok(bytes)
}

/// Extract a gzip tar into `dest`, creating it if needed. Returns the number
/// of entries written. Any entry that would land outside `dest` aborts the
/// extraction with [`ArchiveError::PathTraversal`].
pub fn extract_archive(data: &[u8], dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(data));
    let mut written = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.into_owned();
        ensure_relative(&path)?;

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Directory | EntryType::Continuous => {}
            EntryType::Symlink | EntryType::Link => {
                if let Some(target) = entry.link_name()? {
                    ensure_relative(&target)?;
                }
            }
            other => {
                debug!(path = %path.display(), "Skipping unsupported archive entry {:?}", other);
                continue;
            }
        }

        if !entry.unpack_in(dest)? {
            return Err(ArchiveError::PathTraversal(path.display().to_string()));
        }
        written += 1;
    }

    debug!(entries = written, dest = %dest.display(), "Extracted workspace archive");
    Ok(written)
}

/// Reject absolute paths and any `..` component.
fn ensure_relative(path: &Path) -> Result<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ArchiveError::PathTraversal(path.display().to_string()));
            }
        }
    }
    Ok(())
}
