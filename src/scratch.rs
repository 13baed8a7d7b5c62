//! Scoped scratch directory
//!
//! [`ScratchDir`] owns a temporary directory for the duration of one
//! operation. The directory and its contents are removed when the guard is
//! closed or dropped, whichever comes first, on every exit path.

use crate::error::{PackagerError, PackagerResult};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchDir {
    /// Create a fresh directory under the system temp location
    pub fn new() -> PackagerResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("model-packager-")
            .tempdir()
            .map_err(|e| PackagerError::io(std::env::temp_dir(), e))?;
        Ok(Self::from_temp_dir(dir))
    }

    /// Create a fresh directory under `parent`
    pub fn new_in(parent: &Path) -> PackagerResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("model-packager-")
            .tempdir_in(parent)
            .map_err(|e| PackagerError::io(parent, e))?;
        Ok(Self::from_temp_dir(dir))
    }

    fn from_temp_dir(dir: TempDir) -> Self {
        let path = dir.path().to_path_buf();
        tracing::debug!(path = ?path, "Created scratch directory");
        Self {
            dir: Some(dir),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory now, reporting failure
    pub fn close(mut self) -> PackagerResult<()> {
        match self.dir.take() {
            Some(dir) => {
                dir.close().map_err(|e| PackagerError::io(&self.path, e))?;
                tracing::debug!(path = ?self.path, "Removed scratch directory");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take()
            && let Err(e) = dir.close()
        {
            tracing::warn!(path = ?self.path, error = %e, "Failed to remove scratch directory");
        }
    }
}
