//! Exit code constants for the dbzip CLI.
//!
//! - 0: Completed
//! - 1: Bad input, configuration or infrastructure error
//! - 2: The run failed (lock, production, compression or verification)
//! - 3: Skipped because another run holds the lock

use dbzip_core::{Error, RunOutcome};

/// Successful execution.
pub const SUCCESS: u8 = 0;

/// Bad arguments, bad configuration, or an error outside the pipeline.
pub const USER_ERROR: u8 = 1;

/// A pipeline stage failed; needs attention.
pub const RUN_FAILED: u8 = 2;

/// Another run owns the lock; nothing happened, harmless.
pub const LOCK_SKIPPED: u8 = 3;

/// Exit code for a finished run
pub fn for_outcome(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Completed { .. } => SUCCESS,
        RunOutcome::LockSkipped { .. } => LOCK_SKIPPED,
        RunOutcome::Failed { .. } => RUN_FAILED,
    }
}

/// Exit code for a run that never produced a report.
///
/// Pipeline ordering bugs count as a failed run so they are not mistaken for
/// operator error.
pub fn for_error(err: &Error) -> u8 {
    if err.is_internal() {
        RUN_FAILED
    } else {
        USER_ERROR
    }
}
