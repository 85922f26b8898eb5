//! Advisory cross-process file lock
//!
//! Acquired by exclusively creating a lock file that records the holder's
//! pid and acquisition time. Released when the guard drops. A lock file not
//! touched for [`STALE_AFTER`] is assumed abandoned by a crashed process and
//! taken over; holders call [`FileLock::touch`] while they work.

use crate::error::{CapsuleError, CapsuleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Interval between acquisition attempts
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Age after which an existing lock file is reclaimed
pub const STALE_AFTER: Duration = Duration::from_secs(10 * 60);

/// Contents of the lock file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// Held lock; the file is removed on drop
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Try once to take the lock. `Ok(None)` means another holder has it.
    pub fn try_acquire(path: &Path) -> CapsuleResult<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CapsuleError::io(format!("creating lock directory {}", parent.display()), e)
            })?;
        }

        if let Some(lock) = Self::create(path)? {
            debug!("Acquired lock {}", path.display());
            return Ok(Some(lock));
        }

        if is_stale(path) {
            warn!("Reclaiming stale lock {}", path.display());
            let _ = std::fs::remove_file(path);
            // Losing the race to another reclaimer is reported as busy
            return Self::create(path);
        }
        Ok(None)
    }

    fn create(path: &Path) -> CapsuleResult<Option<Self>> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                let info = LockInfo {
                    pid: std::process::id(),
                    acquired_at: Utc::now(),
                };
                // Holder info is diagnostic only; a short write still holds the lock
                let _ = writeln!(file, "{}", serde_json::to_string(&info)?);
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(CapsuleError::io(
                format!("creating lock {}", path.display()),
                e,
            )),
        }
    }

    /// Poll until the lock is free or `timeout` elapses.
    pub async fn acquire(path: &Path, timeout: Duration) -> CapsuleResult<Self> {
        let started = tokio::time::Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                return Ok(lock);
            }
            if started.elapsed() >= timeout {
                return Err(CapsuleError::LockTimeout {
                    path: path.to_path_buf(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Bump the lock file's mtime so a long-running holder is not
    /// mistaken for an abandoned one.
    pub fn touch(&self) {
        let result = std::fs::File::options()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_modified(SystemTime::now()));
        if let Err(e) = result {
            debug!("Failed to refresh lock {}: {}", self.path.display(), e);
        }
    }

    /// Lock file location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the holder info of an existing lock file
    pub fn holder(path: &Path) -> Option<LockInfo> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(content.trim()).ok()
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

fn is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_AFTER)
}
