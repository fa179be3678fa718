//! Progress notifications
//!
//! Collaborators emit [`Progress`] into a [`ProgressSink`]. The orchestrator tags
//! each notification with the current [`Stage`] and hands the resulting
//! [`ProgressEvent`] to the caller's [`ProgressObserver`] unchanged, in order,
//! without buffering.

use std::sync::Mutex;

use crate::pipeline::Stage;

/// A progress notification as emitted by a collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Percentage complete (0-100), when the collaborator knows it
    pub percent_complete: Option<u8>,

    /// Human readable status line
    pub message: String,
}

impl Progress {
    pub fn percent(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent_complete: Some(percent.min(100)),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            percent_complete: None,
            message: message.into(),
        }
    }
}

/// A progress notification tagged with the pipeline stage that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub percent_complete: Option<u8>,
    pub message: String,
}

/// Receiver for collaborator progress
pub trait ProgressSink: Send + Sync {
    fn emit(&self, progress: Progress);
}

/// Caller-side observer of stage-tagged progress
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

/// Tags collaborator progress with a stage and forwards it to an observer
pub struct StageRelay<'a> {
    stage: Stage,
    observer: &'a dyn ProgressObserver,
}

impl<'a> StageRelay<'a> {
    pub fn new(stage: Stage, observer: &'a dyn ProgressObserver) -> Self {
        Self { stage, observer }
    }
}

impl ProgressSink for StageRelay<'_> {
    fn emit(&self, progress: Progress) {
        self.observer.on_progress(&ProgressEvent {
            stage: self.stage,
            percent_complete: progress.percent_complete,
            message: progress.message,
        });
    }
}

/// Sink that drops everything, for collaborators used outside a pipeline run
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _progress: Progress) {}
}

/// An observer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl ProgressObserver for NoOpObserver {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

/// An observer that logs progress at DEBUG using the `tracing` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        match event.percent_complete {
            Some(percent) => tracing::debug!(
                stage = %event.stage,
                percent = percent,
                "{}",
                event.message
            ),
            None => tracing::debug!(stage = %event.stage, "{}", event.message),
        }
    }
}

/// An observer that records every event.
///
/// Useful for testing.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<ProgressEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl ProgressObserver for CollectingObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
