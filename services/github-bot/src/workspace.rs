//! Scratch Workspace
//!
//! Temporary directory holding the tool and binding clones for one update
//! run. The directory is removed when the guard drops, on success and on
//! every error path alike.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{BotError, Result};

#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Create `<base>/<owner>/<repo>`, discarding anything a previous,
    /// interrupted run left behind.
    pub fn create(base: &Path, owner: &str, repo: &str) -> Result<Self> {
        for segment in [owner, repo] {
            ensure_path_segment(segment)?;
        }

        let root = base.join(owner).join(repo);
        if root.exists() {
            warn!(path = %root.display(), "Removing stale scratch workspace");
            fs::remove_dir_all(&root).map_err(|source| BotError::Workspace {
                path: root.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&root).map_err(|source| BotError::Workspace {
            path: root.clone(),
            source,
        })?;

        debug!(path = %root.display(), "Created scratch workspace");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Location for a clone named `name` inside the workspace.
    pub fn clone_dir(&self, name: &str) -> Result<PathBuf> {
        ensure_path_segment(name)?;
        Ok(self.root.join(name))
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!(path = %self.root.display(), "Removed scratch workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.root.display(),
                error = %e,
                "Failed to remove scratch workspace"
            ),
        }
    }
}

/// Reject names that would escape the workspace when joined onto it.
pub(crate) fn ensure_path_segment(segment: &str) -> Result<()> {
    let unsafe_segment = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
        || segment.contains('\0');

    if unsafe_segment {
        return Err(BotError::Logic(format!("{segment:?} is not a safe path segment")));
    }
    Ok(())
}
