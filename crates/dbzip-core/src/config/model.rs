//! Configuration types
//!
//! Every field has a serde default so a partial file only overrides what it names.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::collaborators::{BackupKind, BackupOptions};
use crate::error::{Error, Result};
use crate::lock::{default_lock_dir, LockNamespace, DEFAULT_LOCK_ID, GLOBAL_PREFIX};

/// Complete dbzip configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DbzipConfig {
    /// Host-wide lock settings
    #[serde(default)]
    pub lock: LockConfig,

    /// Backup production settings
    #[serde(default)]
    pub backup: BackupConfig,

    /// Compression settings
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Lock namespace and waiting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockConfig {
    #[serde(default = "default_namespace_prefix")]
    pub namespace_prefix: String,

    /// Directory holding the lock files; the host temp dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Class-of-job identifier
    #[serde(default = "default_lock_id")]
    pub id: String,

    /// Upper bound when a run waits for the lock; unset waits forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_secs: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            namespace_prefix: default_namespace_prefix(),
            directory: None,
            id: default_lock_id(),
            max_wait_secs: None,
        }
    }
}

impl LockConfig {
    pub fn namespace(&self) -> LockNamespace {
        let directory = self.directory.clone().unwrap_or_else(default_lock_dir);
        LockNamespace::new(&self.namespace_prefix, directory)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

fn default_namespace_prefix() -> String {
    GLOBAL_PREFIX.to_string()
}

fn default_lock_id() -> String {
    DEFAULT_LOCK_ID.to_string()
}

/// Which producer writes the artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProducerKind {
    /// Run an external dump command
    #[default]
    Command,
    /// Copy a file out of a data directory
    File,
}

impl FromStr for ProducerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(ProducerKind::Command),
            "file" => Ok(ProducerKind::File),
            other => Err(Error::invalid_config(format!(
                "unknown producer '{}', expected 'command' or 'file'",
                other
            ))),
        }
    }
}

impl fmt::Display for ProducerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProducerKind::Command => f.write_str("command"),
            ProducerKind::File => f.write_str("file"),
        }
    }
}

/// External dump command. `args` may use `{target}`, `{output}`, `{kind}` and `{expires}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommandConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
        }
    }
}

fn default_program() -> String {
    "pg_dump".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "--format=custom".to_string(),
        "--file={output}".to_string(),
        "{target}".to_string(),
    ]
}

/// Backup production settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BackupConfig {
    /// Where artifacts and archives are written
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Days until the backup set may be overwritten
    #[serde(default = "default_expiration_days")]
    pub expiration_days: u32,

    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    #[serde(default)]
    pub producer: ProducerKind,

    #[serde(default)]
    pub command: CommandConfig,

    /// Source directory for the `file` producer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            expiration_days: default_expiration_days(),
            operation_timeout_secs: default_operation_timeout(),
            producer: ProducerKind::default(),
            command: CommandConfig::default(),
            data_dir: None,
        }
    }
}

impl BackupConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Producer options for a backup of `kind` started at `now`.
    ///
    /// An expiration too far out to represent is `InvalidConfig`.
    pub fn options(&self, kind: BackupKind, now: DateTime<Utc>) -> Result<BackupOptions> {
        let expires_at = TimeDelta::try_days(i64::from(self.expiration_days))
            .and_then(|days| now.checked_add_signed(days))
            .ok_or_else(|| {
                Error::invalid_config(format!(
                    "expiration-days {} is out of range",
                    self.expiration_days
                ))
            })?;

        Ok(BackupOptions {
            kind,
            expires_at: Some(expires_at),
            operation_timeout: Some(self.operation_timeout()),
        })
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_expiration_days() -> u32 {
    7
}

fn default_operation_timeout() -> u64 {
    4 * 60 * 60 // 4 hours
}

/// Archive container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArchiveFormat {
    /// Bare gzip stream of the artifact
    Gzip,
    /// Gzip-compressed tar holding the artifact as its only entry
    #[default]
    TarGz,
}

impl ArchiveFormat {
    /// Extension appended to the artifact name
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Gzip => "gz",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(ArchiveFormat::Gzip),
            "tar-gz" | "tar.gz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(Error::invalid_config(format!(
                "unknown archive format '{}', expected 'gzip' or 'tar-gz'",
                other
            ))),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveFormat::Gzip => f.write_str("gzip"),
            ArchiveFormat::TarGz => f.write_str("tar-gz"),
        }
    }
}

/// Compression settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArchiveConfig {
    #[serde(default)]
    pub format: ArchiveFormat,

    /// 1 (fastest) to 9 (smallest)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::default(),
            compression_level: default_compression_level(),
        }
    }
}

impl ArchiveConfig {
    /// Compression level clamped to the valid range
    pub fn level(&self) -> u32 {
        self.compression_level.clamp(1, 9)
    }
}

fn default_compression_level() -> u32 {
    6
}
