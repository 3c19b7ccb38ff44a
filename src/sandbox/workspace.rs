use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{JudgeError, Result};

const WORKSPACE_PREFIX: &str = "psjudge-";

/// A uniquely named temporary directory owned by one judging run
///
/// Dropping it removes the directory tree, which also covers unwinding.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(JudgeError::Workspace)?;
        log::debug!("Created workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes `source` under `file_name` and returns the full path
    pub fn write_source(&self, file_name: &str, source: &str) -> Result<PathBuf> {
        let path = self.join(file_name);
        fs::write(&path, format!("{source}\n"))?;
        Ok(path)
    }

    /// Removes the directory tree, logging instead of failing
    fn remove(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => log::debug!("Removed workspace {}", path.display()),
            Err(e) => log::warn!("Failed to remove workspace {}: {e}", path.display()),
        }
    }
}

/// Runs `f` inside a fresh workspace under `parent` and removes it before returning
///
/// Only a failure to create the directory is reported as an error; the
/// outcome of `f` is handed back untouched whether or not cleanup succeeds.
pub fn with_workspace<T>(parent: impl AsRef<Path>, f: impl FnOnce(&Workspace) -> T) -> Result<T> {
    let workspace = Workspace::create_in(parent)?;
    let value = f(&workspace);
    workspace.remove();
    Ok(value)
}
