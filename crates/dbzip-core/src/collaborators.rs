//! Boundaries to the collaborators that do the actual work.
//!
//! A [`BackupProducer`] talks to the data source and writes the artifact; an
//! [`Archiver`] compresses it and checks the result. Both report failures as
//! `anyhow::Error`; the orchestrator decides which stage failed.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::naming;
use crate::progress::ProgressSink;

/// Kind of backup to take
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackupKind {
    /// Full backup of the target
    #[default]
    Full,
    /// Incremental backup of the transaction log only
    TransactionLog,
}

impl BackupKind {
    /// Artifact file extension for this kind
    pub fn extension(self) -> &'static str {
        match self {
            BackupKind::Full => "bak",
            BackupKind::TransactionLog => "trn",
        }
    }

    /// Short name used in command templates
    pub fn as_str(self) -> &'static str {
        match self {
            BackupKind::Full => "full",
            BackupKind::TransactionLog => "log",
        }
    }
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options a producer recognizes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOptions {
    pub kind: BackupKind,

    /// When the backup set may be overwritten; passed through, never enforced here
    pub expires_at: Option<DateTime<Utc>>,

    /// Upper bound on the producing operation
    pub operation_timeout: Option<Duration>,
}

/// Everything a producer needs to write one artifact
#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub target: String,
    pub options: BackupOptions,
    pub output_dir: PathBuf,

    /// When production started, taken once the lock is held
    pub started_at: DateTime<Local>,

    /// Disambiguates runs of one target stamped in the same second; 0 for the first
    pub sequence: u32,
}

impl ProduceRequest {
    /// Deterministic artifact path for this request
    pub fn artifact_path(&self) -> PathBuf {
        naming::artifact_path(
            &self.output_dir,
            &self.target,
            &self.started_at,
            self.options.kind.extension(),
            self.sequence,
        )
    }
}

/// Produces an uncompressed backup artifact
#[async_trait]
pub trait BackupProducer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Write the artifact and return its path
    async fn produce(
        &self,
        request: &ProduceRequest,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<PathBuf>;
}

/// Compresses artifacts and verifies the resulting archives
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Compress `source` into a new archive and return the archive path
    async fn compress(&self, source: &Path, progress: &dyn ProgressSink)
        -> anyhow::Result<PathBuf>;

    /// Check the archive structurally. `Ok(false)` means corrupt.
    async fn verify(&self, archive: &Path) -> anyhow::Result<bool>;
}
