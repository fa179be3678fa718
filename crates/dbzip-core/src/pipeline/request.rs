//! What a caller asks for and what it gets back

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Local};

use super::stage::{FailureKind, Stage};
use crate::collaborators::{BackupKind, BackupOptions};
use crate::error::{Error, Result};
use crate::lifecycle::ArtifactState;

/// A request to back up one target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// What is being backed up
    pub target: String,

    /// Block until the lock frees up instead of skipping the run
    pub wait_for_lock: bool,

    /// Class-of-job identifier for the lock; `None` uses the default
    pub lock_name: Option<String>,

    pub options: BackupOptions,
}

impl RunRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            wait_for_lock: false,
            lock_name: None,
            options: BackupOptions::default(),
        }
    }

    pub fn wait_for_lock(mut self, wait: bool) -> Self {
        self.wait_for_lock = wait;
        self
    }

    pub fn with_lock_name(mut self, name: impl Into<String>) -> Self {
        self.lock_name = Some(name.into());
        self
    }

    pub fn with_kind(mut self, kind: BackupKind) -> Self {
        self.options.kind = kind;
        self
    }

    pub fn with_options(mut self, options: BackupOptions) -> Self {
        self.options = options;
        self
    }

    /// Reject requests no producer could act on
    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(Error::invalid_request("target must not be empty"));
        }
        if self.target.chars().any(char::is_control) {
            return Err(Error::invalid_request(format!(
                "target {:?} contains control characters",
                self.target
            )));
        }
        if let Some(name) = &self.lock_name {
            if name.trim().is_empty() {
                return Err(Error::invalid_request("lock name must not be blank"));
            }
        }
        if self.options.operation_timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_request(
                "operation timeout must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Final, caller-visible result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The archive verified; `deleted_original` says whether cleanup removed the artifact
    Completed {
        archive_path: PathBuf,
        deleted_original: bool,
    },

    /// Another run owns the lock and the caller chose not to wait
    LockSkipped { lock: String },

    Failed { kind: FailureKind, message: String },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::LockSkipped { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            RunOutcome::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Everything known about a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub target: String,
    pub outcome: RunOutcome,

    /// Terminal stage the run stopped in
    pub stage: Stage,

    pub artifact_path: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub started_at: DateTime<Local>,
    pub duration: Duration,

    /// Artifact lifecycle states in order; empty when nothing was produced
    pub lifecycle: Vec<ArtifactState>,
}

impl RunReport {
    pub fn deleted_original(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::Completed {
                deleted_original: true,
                ..
            }
        )
    }
}
