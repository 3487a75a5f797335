//! Local store mapping remote URLs to stable on-disk paths
//!
//! One file per URL, named by the URL's final path segment, under a
//! single application-owned directory. Completion is inferred purely
//! from file existence; there is no metadata sidecar.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::core::{FileOperation, Result, TransferError};

/// Fallback name for URLs whose path has no usable final segment
const FALLBACK_FILE_NAME: &str = "downloaded_file";

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create the store, making sure its root directory exists
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| TransferError::storage(&root, FileOperation::CreateDir, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic destination path for a URL.
    ///
    /// Derived from the final non-empty path segment, so it is stable
    /// across process restarts.
    pub fn path_for(&self, url: &str) -> Result<PathBuf> {
        let file_name = file_name_for(url)?;
        Ok(self.root.join(file_name))
    }

    /// Staging path partial data is written to before finalization
    pub fn staging_path(&self, url: &str) -> Result<PathBuf> {
        Ok(self.path_for(url)?.with_extension("part"))
    }

    /// Whether a completed file already exists for this URL
    pub fn exists(&self, url: &str) -> bool {
        self.path_for(url).map(|p| p.exists()).unwrap_or(false)
    }

    /// Atomically place a completed staging file at the canonical path.
    ///
    /// Remove-then-move: removing a nonexistent target is not an error,
    /// and a failed move leaves any existing file untouched.
    pub async fn finalize(&self, url: &str, staging: &Path) -> Result<PathBuf> {
        let dest = self.path_for(url)?;

        // Staging must exist before the destination is removed
        tokio::fs::metadata(staging)
            .await
            .map_err(|e| TransferError::storage(staging, FileOperation::Metadata, e))?;

        match tokio::fs::remove_file(&dest).await {
            Ok(()) => debug!("removed previous file at {}", dest.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("could not remove existing file at {}: {}", dest.display(), e);
                return Err(TransferError::storage(&dest, FileOperation::Delete, e));
            }
        }

        tokio::fs::rename(staging, &dest)
            .await
            .map_err(|e| TransferError::storage(staging, FileOperation::Move, e))?;

        debug!("finalized {} at {}", url, dest.display());
        Ok(dest)
    }
}

/// Extract the file name a URL maps to
fn file_name_for(url: &str) -> Result<String> {
    let parsed = url::Url::parse(url).map_err(|e| TransferError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
        source: Some(e),
    })?;

    if let Some(segments) = parsed.path_segments() {
        if let Some(last) = segments.filter(|s| !s.is_empty()).last() {
            return Ok(last.to_string());
        }
    }
    Ok(FALLBACK_FILE_NAME.to_string())
}
