//! Per-job workspace lifecycle.
//!
//! ## Why a handle, not a global?
//!
//! Every stage takes `&Workspace` explicitly. There is no process-wide
//! "current workspace" to race on: two concurrent jobs hold two handles and
//! never observe each other's state (concurrent *byte-identical* requests
//! still share a key-named directory; that race is documented and accepted
//! because workspaces never outlive their request).
//!
//! ## Cleanup guarantees
//!
//! The directory is removed when the handle is dropped, whichever stage
//! failed (`tempfile::TempDir` semantics, but with a key-derived name under
//! a fixed root). Removal errors are logged at `warn!` and swallowed: by
//! then the response is already on the wire and a leftover directory is the
//! lesser evil.

use crate::error::BuildError;
use crate::jobkey::JobKey;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// An exclusively-owned, job-scoped directory under the temp root.
#[derive(Debug)]
pub struct Workspace {
    key: JobKey,
    dir: PathBuf,
    torn_down: bool,
}

impl Workspace {
    /// Create (idempotently) the directory `root/<key>` and return a handle
    /// owning it.
    pub fn open(key: &JobKey, root: &Path) -> Result<Self, BuildError> {
        let dir = root.join(key.as_str());
        std::fs::create_dir_all(&dir).map_err(|source| BuildError::WorkspaceCreate {
            path: dir.clone(),
            source,
        })?;
        debug!(workspace = %dir.display(), "workspace opened");
        Ok(Self {
            key: key.clone(),
            dir,
            torn_down: false,
        })
    }

    /// The job key this workspace belongs to.
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// The workspace directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve a file inside the workspace.
    ///
    /// Rejects absolute paths and any path containing a parent component:
    /// pieces of the relative path derive from request fields, and none of
    /// them may name a file outside the job directory.
    pub fn path(&self, relative: impl AsRef<Path>) -> Result<PathBuf, BuildError> {
        let relative = relative.as_ref();
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            return Err(BuildError::PathEscape {
                relative: relative.to_path_buf(),
            });
        }
        Ok(self.dir.join(relative))
    }

    /// Tear the workspace down now instead of waiting for drop.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(workspace = %self.dir.display(), "workspace removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.dir.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown();
    }
}
