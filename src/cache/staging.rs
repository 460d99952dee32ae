use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// A scratch directory for one in-flight download.
///
/// Dropping an uncommitted `Staging` removes the directory and whatever was
/// partially written to it.
#[derive(Debug)]
pub struct Staging {
    dir: PathBuf,
    committed: bool,
}

impl Staging {
    pub(crate) fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            committed: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for a file inside the staging directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed = true;
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.committed || !self.dir.exists() {
            return;
        }
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => debug!(dir = %self.dir.display(), "discarded staged download"),
            Err(e) => warn!(dir = %self.dir.display(), error = %e, "could not discard staging dir"),
        }
    }
}
