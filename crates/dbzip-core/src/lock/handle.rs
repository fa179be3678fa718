//! Held lock handle with scoped release

use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};

use super::namespace::LockName;
use super::policy::WaitPolicy;
use crate::error::{Error, Result};

/// Identity of the process holding a lock, for diagnostics only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub host: String,
    pub user: String,
    pub acquired_at: DateTime<Utc>,
}

impl LockOwner {
    /// Owner record for the current process
    pub fn current() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            pid: std::process::id(),
            host: current_hostname(),
            user,
            acquired_at: Utc::now(),
        }
    }
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid {} ({}@{}) since {}",
            self.pid,
            self.user,
            self.host,
            self.acquired_at.to_rfc3339()
        )
    }
}

fn current_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .or_else(|_| std::fs::read_to_string("/etc/hostname").map(|s| s.trim().to_string()))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// One granted exclusive lock.
///
/// Released by [`LockHandle::release`] or, failing that, on drop. Release is
/// idempotent: the OS lock is given up at most once.
#[derive(Debug)]
pub struct LockHandle {
    name: LockName,
    path: PathBuf,
    policy: WaitPolicy,
    owner: LockOwner,
    file: Option<File>,
}

impl LockHandle {
    pub(super) fn acquired(name: LockName, path: PathBuf, file: File, policy: WaitPolicy) -> Self {
        let owner = LockOwner::current();
        if let Err(e) = write_owner(&file, &owner) {
            tracing::debug!(lock = %name, error = %e, "could not record lock owner");
        }

        Self {
            name,
            path,
            policy,
            owner,
            file: Some(file),
        }
    }

    pub fn name(&self) -> &LockName {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    pub fn owner(&self) -> &LockOwner {
        &self.owner
    }

    pub fn is_acquired(&self) -> bool {
        self.file.is_some()
    }

    /// Give up the lock. Calling this again after a release is a no-op.
    pub fn release(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };

        tracing::debug!(lock = %self.name, "releasing lock");
        // Closing the file drops the OS lock even if the explicit unlock fails.
        let unlocked = FileExt::unlock(&file);
        drop(file);
        unlocked.map_err(|e| Error::lock(self.name.to_string(), e))
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(lock = %self.name, error = %e, "failed to release lock cleanly");
        }
    }
}

fn write_owner(mut file: &File, owner: &LockOwner) -> std::io::Result<()> {
    let json = serde_json::to_string(owner).map_err(std::io::Error::other)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(json.as_bytes())?;
    file.flush()
}

/// Read the owner record left in a lock file, if any
pub(super) fn read_owner(path: &Path) -> Option<LockOwner> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(content.trim()).ok()
}
