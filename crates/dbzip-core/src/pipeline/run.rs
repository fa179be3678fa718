//! State of one in-flight pipeline execution

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Local};

use super::request::{RunOutcome, RunReport};
use super::stage::Stage;
use crate::error::{Error, Result};
use crate::lifecycle::ArtifactRecord;

/// One end-to-end execution. Only the orchestrator moves it forward.
#[derive(Debug)]
pub struct PipelineRun {
    target: String,
    stage: Stage,
    artifact_path: Option<PathBuf>,
    archive_path: Option<PathBuf>,
    started_at: DateTime<Local>,
    clock: Instant,
}

impl PipelineRun {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            stage: Stage::Idle,
            artifact_path: None,
            archive_path: None,
            started_at: Local::now(),
            clock: Instant::now(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.artifact_path.as_deref()
    }

    pub fn archive_path(&self) -> Option<&Path> {
        self.archive_path.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub(crate) fn advance(&mut self, next: Stage) -> Result<()> {
        if !self.stage.can_transition_to(next) {
            return Err(Error::IllegalStage {
                from: self.stage,
                to: next,
            });
        }
        tracing::trace!(from = %self.stage, to = %next, "pipeline transition");
        self.stage = next;
        Ok(())
    }

    pub(crate) fn set_artifact(&mut self, path: PathBuf) {
        self.artifact_path = Some(path);
    }

    pub(crate) fn set_archive(&mut self, path: PathBuf) -> Result<()> {
        if self.artifact_path.is_none() {
            return Err(Error::invalid_request(format!(
                "archive {} recorded before any artifact",
                path.display()
            )));
        }
        self.archive_path = Some(path);
        Ok(())
    }

    /// Record the outcome and turn the run into a report
    pub(crate) fn finish(self, outcome: RunOutcome, record: Option<&ArtifactRecord>) -> RunReport {
        RunReport {
            target: self.target,
            outcome,
            stage: self.stage,
            artifact_path: self.artifact_path,
            archive_path: self.archive_path,
            started_at: self.started_at,
            duration: self.clock.elapsed(),
            lifecycle: record.map(|r| r.history().to_vec()).unwrap_or_default(),
        }
    }
}
