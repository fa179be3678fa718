//! Lock naming.
//!
//! Every lock name is a namespace prefix plus an identifier. The default
//! namespace is host-global: one shared directory, one lock per name for the
//! whole machine, never per user or per session.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Prefix of the host-global namespace
pub const GLOBAL_PREFIX: &str = "Global";

/// Identifier used when the caller does not name the class of job
pub const DEFAULT_LOCK_ID: &str = "dbzip-backup";

/// Default directory that holds host-global lock files
pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("dbzip-locks")
}

/// A namespace prefix together with the directory its lock files live in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockNamespace {
    prefix: String,
    directory: PathBuf,
}

impl LockNamespace {
    pub fn new(prefix: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            prefix: sanitize(&prefix.into()),
            directory: directory.into(),
        }
    }

    /// The host-global namespace in the default lock directory
    pub fn global() -> Self {
        Self::new(GLOBAL_PREFIX, default_lock_dir())
    }

    /// The host-global namespace rooted at a custom directory
    pub fn global_in(directory: impl Into<PathBuf>) -> Self {
        Self::new(GLOBAL_PREFIX, directory)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Derive the lock name for a job identifier, falling back to [`DEFAULT_LOCK_ID`]
    pub fn name(&self, id: Option<&str>) -> Result<LockName> {
        let raw = match id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => DEFAULT_LOCK_ID,
        };

        let id = sanitize(raw);
        if !id.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::InvalidLockName {
                name: raw.to_string(),
            });
        }

        Ok(LockName {
            prefix: self.prefix.clone(),
            id,
        })
    }

    /// Path of the lock file backing `name`
    pub fn lock_path(&self, name: &LockName) -> PathBuf {
        self.directory.join(name.file_name())
    }
}

impl Default for LockNamespace {
    fn default() -> Self {
        Self::global()
    }
}

/// Fully qualified lock name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockName {
    prefix: String,
    id: String,
}

impl LockName {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name of the lock file, e.g. `global.dbzip-backup.lock`
    pub fn file_name(&self) -> String {
        if self.prefix.is_empty() {
            format!("{}.lock", self.id)
        } else {
            format!("{}.{}.lock", self.prefix.to_ascii_lowercase(), self.id)
        }
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.id)
        } else {
            write!(f, "{}\\{}", self.prefix, self.id)
        }
    }
}

/// Keep `[A-Za-z0-9._-]`, replace everything else with `_`
fn sanitize(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
