//! # dbzip-core
//!
//! Core library for dbzip providing:
//! - Host-wide named exclusive regions backed by OS file locks
//! - The backup pipeline (produce, compress, verify, clean up) and its state machine
//! - Artifact lifecycle bookkeeping
//! - Collaborator traits for producers and archivers, with progress relay
//! - Hierarchical configuration loading

pub mod collaborators;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod lock;
pub mod naming;
pub mod pipeline;
pub mod progress;

pub use collaborators::{Archiver, BackupKind, BackupOptions, BackupProducer, ProduceRequest};
pub use config::{ConfigLoader, DbzipConfig};
pub use error::{Error, Result};
pub use lock::{ExclusiveRegion, LockHandle, LockNamespace, WaitPolicy};
pub use pipeline::{
    FailureKind, PipelineOrchestrator, PipelineSettings, RunOutcome, RunReport, RunRequest, Stage,
};
pub use progress::{Progress, ProgressEvent, ProgressObserver, ProgressSink};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
