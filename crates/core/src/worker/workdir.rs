use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::WorkerError;

/// Per-scene working directory, `<base>/<order_id>/<scene_id>`, with
/// `stage`, `work` and `output` below it.
///
/// The directory is removed when the guard drops, including during a
/// panic unwind, unless it was created with `keep`.
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create the directory tree, replacing anything left by an earlier run.
    pub async fn create(
        base: &Path,
        order_id: &str,
        scene_id: &str,
        keep: bool,
    ) -> Result<Self, WorkerError> {
        let root = base.join(component(order_id)?).join(component(scene_id)?);

        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => debug!(path = %root.display(), "Removed leftover work directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(WorkerError::io(
                    format!("removing old work directory {}", root.display()),
                    e,
                ))
            }
        }

        // Guard first so a partial tree is still cleaned up.
        let dir = Self { root, keep };
        for sub in [dir.stage(), dir.work(), dir.output()] {
            tokio::fs::create_dir_all(&sub).await.map_err(|e| {
                WorkerError::io(format!("creating {}", sub.display()), e)
            })?;
        }
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where input is copied before unpacking.
    pub fn stage(&self) -> PathBuf {
        self.root.join("stage")
    }

    /// Where the science tools run.
    pub fn work(&self) -> PathBuf {
        self.root.join("work")
    }

    /// Deliverables, packaged by distribution.
    pub fn output(&self) -> PathBuf {
        self.root.join("output")
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            debug!(path = %self.root.display(), "Keeping work directory");
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.root.display(), error = %e, "Failed to remove work directory");
            }
        }
    }
}

fn component(name: &str) -> Result<&str, WorkerError> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(name)
    } else {
        Err(WorkerError::InvalidPath(name.to_string()))
    }
}
