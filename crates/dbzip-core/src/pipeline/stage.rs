//! Pipeline stages and the transitions allowed between them

use std::fmt;

/// Which part of the run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The lock could not be used, or a bounded wait for it ran out
    Lock,
    Production,
    Compression,
    Verification,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Lock => "lock-error",
            FailureKind::Production => "production-error",
            FailureKind::Compression => "compression-error",
            FailureKind::Verification => "verification-error",
        };
        f.write_str(s)
    }
}

/// Position of a run in the pipeline state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Idle,
    AcquiringLock,
    Producing,
    Compressing,
    Verifying,
    CleaningUp,
    Completed,
    LockSkipped,
    Failed(FailureKind),
}

impl Stage {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Idle, AcquiringLock)
                | (AcquiringLock, Producing)
                | (AcquiringLock, LockSkipped)
                | (AcquiringLock, Failed(FailureKind::Lock))
                | (Producing, Compressing)
                | (Producing, Failed(FailureKind::Production))
                | (Compressing, Verifying)
                | (Compressing, Failed(FailureKind::Compression))
                | (Verifying, CleaningUp)
                | (Verifying, Failed(FailureKind::Verification))
                | (CleaningUp, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::LockSkipped | Stage::Failed(_))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Idle => f.write_str("idle"),
            Stage::AcquiringLock => f.write_str("acquiring-lock"),
            Stage::Producing => f.write_str("producing"),
            Stage::Compressing => f.write_str("compressing"),
            Stage::Verifying => f.write_str("verifying"),
            Stage::CleaningUp => f.write_str("cleaning-up"),
            Stage::Completed => f.write_str("completed"),
            Stage::LockSkipped => f.write_str("lock-skipped"),
            Stage::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}
