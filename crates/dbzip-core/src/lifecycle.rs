//! Bookkeeping for one produced artifact as it moves through compression and cleanup.
//!
//! `Deleted` is only reachable from `Verified`. `Abandoned` is reachable from any
//! non-terminal state and leaves the file on disk for manual inspection.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};

/// Lifecycle state of an artifact file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactState {
    Created,
    Compressed,
    Verified,
    Deleted,
    Abandoned,
}

impl ArtifactState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(self, ArtifactState::Deleted | ArtifactState::Abandoned)
    }

    fn can_transition_to(self, next: ArtifactState) -> bool {
        use ArtifactState::*;
        match (self, next) {
            (Created, Compressed) | (Compressed, Verified) | (Verified, Deleted) => true,
            (from, Abandoned) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactState::Created => "created",
            ArtifactState::Compressed => "compressed",
            ArtifactState::Verified => "verified",
            ArtifactState::Deleted => "deleted",
            ArtifactState::Abandoned => "abandoned",
        };
        f.write_str(s)
    }
}

/// Tracks one artifact and every state it has passed through
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    path: PathBuf,
    history: Vec<ArtifactState>,
}

impl ArtifactRecord {
    /// Start tracking a freshly produced artifact
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            history: vec![ArtifactState::Created],
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current lifecycle state
    pub fn state(&self) -> ArtifactState {
        // history always starts with Created
        self.history
            .last()
            .copied()
            .unwrap_or(ArtifactState::Created)
    }

    /// Every state recorded so far, oldest first
    pub fn history(&self) -> &[ArtifactState] {
        &self.history
    }

    pub fn mark_compressed(&mut self) -> Result<()> {
        self.transition(ArtifactState::Compressed)
    }

    pub fn mark_verified(&mut self) -> Result<()> {
        self.transition(ArtifactState::Verified)
    }

    pub fn mark_deleted(&mut self) -> Result<()> {
        self.transition(ArtifactState::Deleted)
    }

    pub fn mark_abandoned(&mut self) -> Result<()> {
        self.transition(ArtifactState::Abandoned)
    }

    fn transition(&mut self, next: ArtifactState) -> Result<()> {
        let current = self.state();
        if !current.can_transition_to(next) {
            return Err(Error::IllegalTransition {
                path: self.path.display().to_string(),
                from: current,
                to: next,
            });
        }
        self.history.push(next);
        Ok(())
    }
}
