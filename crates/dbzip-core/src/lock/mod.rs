//! Host-wide named mutual exclusion.
//!
//! A lock is an advisory OS file lock (`flock` on Unix, `LockFileEx` on Windows)
//! taken on a file inside a host-global directory, so it is honored by every
//! process on the machine regardless of which account runs it.
//!
//! # Abandonment
//!
//! The kernel drops the lock when the holding process exits for any reason.
//! A run that crashed while holding the lock therefore never blocks the next
//! acquirer: the next `acquire` succeeds and overwrites the stale owner record.
//! The lock file itself is never deleted; removing it would let two processes
//! hold locks on different inodes under the same name.
//!
//! # Wait policies
//!
//! - [`WaitPolicy::FailFast`]: try once, `LockTimeout` if held
//! - [`WaitPolicy::Forever`]: block until released
//! - [`WaitPolicy::Bounded`]: poll until the deadline, then `LockTimeout`

mod handle;
mod namespace;
mod policy;
mod region;

pub use handle::{LockHandle, LockOwner};
pub use namespace::{default_lock_dir, LockName, LockNamespace, DEFAULT_LOCK_ID, GLOBAL_PREFIX};
pub use policy::WaitPolicy;
pub use region::{ExclusiveRegion, LockStatus};
