//! Scoped working directories for deploys

use crate::core::Deploy;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Creates one fresh directory per deploy under a root
#[derive(Debug, Clone)]
pub struct WorkspaceFactory {
    root: PathBuf,
}

impl WorkspaceFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Factory rooted at the system temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir())
    }

    /// Create the working directory for one deploy
    pub fn acquire(&self, deploy: &Deploy) -> Result<Workspace> {
        self.acquire_named(&format!("{}-{}-", deploy.stack, deploy.short_id()))
    }

    /// Create a working directory with a name prefix
    pub fn acquire_named(&self, prefix: &str) -> Result<Workspace> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create workspace root {}", self.root.display()))?;

        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(&self.root)
            .with_context(|| format!("Failed to create workspace in {}", self.root.display()))?;

        debug!("Acquired workspace {}", dir.path().display());
        Ok(Workspace { dir: Some(dir) })
    }
}

/// A working directory that is removed when released or dropped
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        match &self.dir {
            Some(dir) => dir.path(),
            None => Path::new(""),
        }
    }

    /// Remove the directory, logging instead of failing
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("Released workspace {}", path.display()),
                Err(e) => warn!("Failed to remove workspace {}: {}", path.display(), e),
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}
