//! Advisory on-disk lockfile guarding a collection directory against
//! concurrent opens by two managers. Detection of a stale lock is advisory
//! only, per the concurrency model: we warn and proceed rather than refuse.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct DirLock {
    path: PathBuf,
}

impl DirLock {
    pub fn acquire(dir: &Path) -> std::io::Result<Self> {
        let path = dir.join(".lock");
        if path.exists() {
            warn!(path = %path.display(), "found existing lockfile; treating as stale and continuing");
        }
        fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
