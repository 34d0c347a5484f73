//! Cross-process lock on a models directory
//!
//! An OS advisory lock on a persistent lock file, held for the duration of a
//! rebuild so two processes sharing a directory never write artifacts
//! concurrently. The OS drops the lock when its holder dies, so there is no
//! staleness rule.

use crate::error::ModelsError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::cache::LOCK_FILE;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Held lock; unlocked on drop. The lock file itself is never removed.
#[derive(Debug)]
pub struct DirectoryLock {
    file: File,
    path: PathBuf,
}

impl DirectoryLock {
    /// Acquire the lock on `dir`, waiting at most `timeout`
    pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self, ModelsError> {
        fs::create_dir_all(dir)
            .map_err(|e| ModelsError::io(format!("Failed to create {}", dir.display()), e))?;

        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| ModelsError::io(format!("Failed to open {}", path.display()), e))?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("Acquired models lock {}", path.display());
                    return Ok(Self { file, path });
                }
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {}
                Err(e) => {
                    return Err(ModelsError::io(format!("Failed to lock {}", path.display()), e));
                }
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ModelsError::LockTimeout { path, waited });
            }
            thread::sleep(POLL_INTERVAL.min(timeout - waited));
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release models lock {}: {}", self.path.display(), e);
        }
    }
}
