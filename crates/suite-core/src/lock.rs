//! Per-workspace single-writer locks.
//!
//! A lock is an OS advisory exclusive lock (`fs2`) on a persistent file such
//! as `<workspace>/.suite/propagation.lock`. The file is never deleted; only
//! the OS lock on it matters, and the OS drops that lock when the holder's
//! file handle closes, including when the holder process dies. After locking,
//! the holder's pid and purpose are written into the file for diagnostics.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BackoffPolicy;
use crate::domain::{PublishError, Result};

/// Serialises publish + dependent propagation within one workspace.
pub const LOCK_FILE: &str = ".suite/propagation.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    /// What the holder is doing, e.g. `publish @suite/cache@1.2.0`.
    pub purpose: String,
}

impl LockHolder {
    fn current(purpose: &str) -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            purpose: purpose.to_string(),
        }
    }
}

impl std::fmt::Display for LockHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pid {} since {} ({})",
            self.pid,
            self.acquired_at.to_rfc3339(),
            self.purpose
        )
    }
}

/// A held lock; released when dropped.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
    holder: LockHolder,
}

impl WorkspaceLock {
    pub fn path_for(root: &Path) -> PathBuf {
        root.join(LOCK_FILE)
    }

    /// One attempt at the propagation lock of `root`. `Ok(None)` while held elsewhere.
    pub fn try_acquire(root: &Path, purpose: &str) -> Result<Option<Self>> {
        Self::try_acquire_file(&Self::path_for(root), purpose)
    }

    /// One attempt at an exclusive lock on `path`, creating it if needed.
    pub fn try_acquire_file(path: &Path, purpose: &str) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                debug!(path = %path.display(), holder = ?Self::read_holder(path), "lock busy");
                return Ok(None);
            }
            return Err(e.into());
        }

        let holder = LockHolder::current(purpose);
        let body = serde_json::to_vec(&holder)?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&body)?;
        file.sync_all()?;

        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
            holder,
        }))
    }

    /// Acquire the propagation lock of `root`, retrying on the given schedule.
    pub async fn acquire(root: &Path, purpose: &str, backoff: &BackoffPolicy) -> Result<Self> {
        for delay in backoff.delays() {
            if let Some(lock) = Self::try_acquire(root, purpose)? {
                return Ok(lock);
            }
            tokio::time::sleep(delay).await;
        }
        if let Some(lock) = Self::try_acquire(root, purpose)? {
            return Ok(lock);
        }
        Err(PublishError::LockTimeout {
            path: Self::path_for(root),
        }
        .into())
    }

    /// Last holder recorded in `path`, if any. May describe a released lock.
    pub fn read_holder(path: &Path) -> Option<LockHolder> {
        std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }

    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}
