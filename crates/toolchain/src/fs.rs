//! Staging directories and archive handling.
//!
//! Every pipeline run stages its inputs into a fresh temp directory and
//! must leave nothing behind on any exit path. Deletion failures are
//! logged, never escalated.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use tar::Archive;
use tempdir::TempDir;

use crate::error::{Result, ToolchainError};

/// A temp directory that is removed on every exit path.
///
/// `close()` reports deletion problems at debug level on the happy path;
/// `Drop` covers early returns and panics.
pub struct StagingDir {
    dir: Option<TempDir>,
}

impl StagingDir {
    /// Create a fresh staging directory with the given name prefix.
    pub fn new(prefix: &str) -> Result<Self> {
        let dir = TempDir::new(prefix)?;
        tracing::debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self { dir: Some(dir) })
    }

    /// Path of the directory.
    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .expect("staging directory accessed after close")
            .path()
    }

    /// Join a file name onto the directory.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path().join(name)
    }

    /// Delete the directory now instead of waiting for drop.
    pub fn close(mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staging directory");
            } else {
                tracing::debug!(path = %path.display(), "removed staging directory");
            }
        }
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove staging directory");
            }
        }
    }
}

/// Unpack a gzipped tarball into `dest`.
pub fn extract_tar_gz(bytes: &[u8], dest: &Path) -> Result<()> {
    let decoder = GzDecoder::new(Cursor::new(bytes));
    let mut archive = Archive::new(decoder);
    archive
        .unpack(dest)
        .map_err(|e| ToolchainError::Validation(format!("failed to extract archive: {e}")))?;
    tracing::debug!(dest = %dest.display(), "extracted project archive");
    Ok(())
}

/// Human-readable listing of a directory, used in artifact-missing errors.
pub fn dir_listing(path: &Path) -> String {
    match std::fs::read_dir(path) {
        Err(_) => format!("{} (unreadable)", path.display()),
        Ok(entries) => {
            let names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            if names.is_empty() {
                format!("{} (empty)", path.display())
            } else {
                names.join(", ")
            }
        }
    }
}

/// First file in `dir` whose name ends with `extension` (e.g. ".so").
pub fn find_by_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.to_ascii_lowercase().ends_with(extension))
        })
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Strip any directory components from an uploaded file name.
pub fn safe_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string())
}
