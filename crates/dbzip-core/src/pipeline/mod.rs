//! Backup pipeline: produce, compress, verify, clean up.
//!
//! ```text
//! Idle -> AcquiringLock -> Producing -> Compressing -> Verifying -> CleaningUp -> Completed
//!              |               |             |             |
//!              v               v             v             v
//!   LockSkipped / Failed(Lock) Failed(Production) Failed(Compression) Failed(Verification)
//! ```
//!
//! The lock covers only the producing step. The source artifact is deleted
//! only after its archive verified, and every failure leaves the artifact (and
//! any partial archive) on disk.

mod orchestrator;
mod request;
mod run;
mod stage;

pub use orchestrator::{PipelineOrchestrator, PipelineSettings};
pub use request::{RunOutcome, RunReport, RunRequest};
pub use run::PipelineRun;
pub use stage::{FailureKind, Stage};

#[cfg(test)]
mod tests;
