//! Per-request scratch directories.
//!
//! Every execution gets `<work_root>/<request-id>/`. Artifacts that must be
//! named after their content (JVM classes) only ever exist inside their own
//! request's directory, so concurrent requests cannot clobber each other.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Scratch directory owned by a single execution.
///
/// Call [`Workspace::cleanup`] when the execution ends. If the owning future
/// is dropped first, `Drop` removes the directory synchronously instead.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    dir: PathBuf,
    artifacts: Vec<PathBuf>,
    cleaned: bool,
}

impl Workspace {
    /// Create a fresh, empty workspace under `root`.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let id = Uuid::new_v4();
        let dir = root.join(id.to_string());
        tokio::fs::create_dir_all(root).await?;
        tokio::fs::create_dir(&dir).await?;
        debug!(workspace = %id, dir = %dir.display(), "Created workspace");
        Ok(Self {
            id,
            dir,
            artifacts: Vec::new(),
            cleaned: false,
        })
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Register a file inside the workspace for cleanup and return its path.
    ///
    /// Used for outputs produced by a build step.
    pub fn track(&mut self, file_name: &str) -> PathBuf {
        let path = self.dir.join(file_name);
        self.artifacts.push(path.clone());
        path
    }

    /// Write `contents` verbatim to `file_name` and track it.
    pub async fn write_artifact(&mut self, file_name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.track(file_name);
        tokio::fs::write(&path, contents).await?;
        debug!(workspace = %self.id, path = %path.display(), bytes = contents.len(), "Wrote artifact");
        Ok(path)
    }

    /// Delete every tracked artifact, then the directory itself.
    ///
    /// Failures are logged and swallowed; they never change the outcome
    /// reported to the caller.
    pub async fn cleanup(mut self) {
        for path in &self.artifacts {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                // Build never produced it, or the run failed before it.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(workspace = %self.id, path = %path.display(), error = %e, "Failed to delete artifact");
                }
            }
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(workspace = %self.id, dir = %self.dir.display(), error = %e, "Failed to remove workspace");
            }
        }

        self.cleaned = true;
        debug!(workspace = %self.id, "Workspace cleaned up");
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(workspace = %self.id, dir = %self.dir.display(), error = %e, "Failed to remove abandoned workspace");
            }
        }
    }
}
