//! Acquisition of host-wide exclusive regions

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs4::fs_std::FileExt;

use super::handle::{read_owner, LockHandle, LockOwner};
use super::namespace::{LockName, LockNamespace};
use super::policy::WaitPolicy;
use crate::error::{Error, Result};

/// Interval between attempts while waiting with a bounded policy
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Whether a named lock is currently taken
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    Held { owner: Option<LockOwner> },
}

/// Named, host-wide mutual exclusion over a lock namespace
#[derive(Debug, Clone, Default)]
pub struct ExclusiveRegion {
    namespace: LockNamespace,
}

impl ExclusiveRegion {
    pub fn new(namespace: LockNamespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &LockNamespace {
        &self.namespace
    }

    /// Acquire the lock for `id` (or the default identifier) under `policy`.
    ///
    /// Returns `Error::LockTimeout` when the lock is held and the policy gives
    /// up; any other error is an actual failure to use the lock file.
    pub fn acquire(&self, id: Option<&str>, policy: WaitPolicy) -> Result<LockHandle> {
        let name = self.namespace.name(id)?;
        let path = self.namespace.lock_path(&name);

        ensure_lock_dir(self.namespace.directory()).map_err(|e| Error::lock(name.to_string(), e))?;
        let file = open_lock_file(&path).map_err(|e| Error::lock(name.to_string(), e))?;

        tracing::debug!(lock = %name, policy = %policy, "acquiring lock");
        match policy {
            WaitPolicy::Forever => {
                FileExt::lock_exclusive(&file).map_err(|e| Error::lock(name.to_string(), e))?;
            }
            WaitPolicy::FailFast => {
                if !try_lock(&file, &name)? {
                    return Err(contention(&name, &path));
                }
            }
            WaitPolicy::Bounded(limit) => {
                let start = Instant::now();
                while !try_lock(&file, &name)? {
                    let elapsed = start.elapsed();
                    if elapsed >= limit {
                        return Err(contention(&name, &path));
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL.min(limit - elapsed));
                }
            }
        }

        tracing::debug!(lock = %name, "lock acquired");
        Ok(LockHandle::acquired(name, path, file, policy))
    }

    /// [`acquire`](Self::acquire) on tokio's blocking pool
    pub async fn acquire_async(&self, id: Option<String>, policy: WaitPolicy) -> Result<LockHandle> {
        let region = self.clone();
        tokio::task::spawn_blocking(move || region.acquire(id.as_deref(), policy))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    /// Run `work` while holding the lock.
    ///
    /// Returns `Ok(false)` without running `work` when the lock is held by
    /// another run and the policy gave up. Other lock errors propagate.
    pub fn run<F>(&self, id: Option<&str>, policy: WaitPolicy, work: F) -> Result<bool>
    where
        F: FnOnce(),
    {
        let mut handle = match self.acquire(id, policy) {
            Ok(handle) => handle,
            Err(e) if e.is_lock_contention() => {
                tracing::debug!(error = %e, "skipping work, lock is held");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        work();
        handle.release()?;
        Ok(true)
    }

    /// Report whether the lock for `id` is held, without keeping it
    pub fn probe(&self, id: Option<&str>) -> Result<LockStatus> {
        let name = self.namespace.name(id)?;
        let path = self.namespace.lock_path(&name);

        let file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LockStatus::Free),
            Err(e) => return Err(Error::lock(name.to_string(), e)),
        };

        if try_lock(&file, &name)? {
            FileExt::unlock(&file).map_err(|e| Error::lock(name.to_string(), e))?;
            Ok(LockStatus::Free)
        } else {
            Ok(LockStatus::Held {
                owner: read_owner(&path),
            })
        }
    }
}

fn try_lock(file: &File, name: &LockName) -> Result<bool> {
    FileExt::try_lock_exclusive(file).map_err(|e| Error::lock(name.to_string(), e))
}

fn contention(name: &LockName, path: &Path) -> Error {
    let holder = read_owner(path).map(|owner| owner.to_string());
    Error::lock_timeout(name.to_string(), holder)
}

/// Create the lock directory so that every local account can add lock files to it
fn ensure_lock_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o1777)) {
            tracing::warn!(path = %dir.display(), error = %e, "failed to open up lock directory permissions");
        }
    }
    Ok(())
}

/// Open (creating if needed) a lock file that every local account can lock
fn open_lock_file(path: &Path) -> std::io::Result<File> {
    let existed = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)?;

    #[cfg(unix)]
    if !existed {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o666)) {
            tracing::warn!(path = %path.display(), error = %e, "failed to open up lock file permissions");
        }
    }
    #[cfg(not(unix))]
    let _ = existed;

    Ok(file)
}
