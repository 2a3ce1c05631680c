use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The per-request directory the reporters write into.
///
/// Shared (`Arc<WorkDir>`) between the pipeline and every stream opened on
/// one of its artifacts; the directory is removed when the last holder lets
/// go, if deletion was requested. Removal failures are logged, never raised.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    delete: bool,
}

impl WorkDir {
    pub fn create(path: &Path, delete: bool) -> std::io::Result<Self> {
        fs::create_dir_all(path)?;
        Ok(WorkDir {
            path: path.to_path_buf(),
            delete,
        })
    }

    /// A fresh `runcov-*` directory under the system temp dir
    pub fn temporary(delete: bool) -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("runcov-")
            .tempdir()?
            .keep();
        Ok(WorkDir { path, delete })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if !self.delete || !self.path.exists() {
            return;
        }
        match fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Removed coverage directory {}", self.path.display()),
            Err(e) => warn!(
                "Failed to clean up coverage directory '{}': {}",
                self.path.display(),
                e
            ),
        }
    }
}
