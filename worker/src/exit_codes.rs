//! Stable exit codes for worker CLI commands.

use crate::error::WorkerError;

/// Invocation completed and the runner resolved.
pub const OK: i32 = 0;
/// Rejected input: invalid context/options, bad locator, or an
/// unloadable/contract-violating runner module.
pub const INVALID: i32 = 1;
/// Input accepted but the invocation failed at runtime (channel,
/// environment, or runner execution).
pub const FAILED: i32 = 2;

/// Map a bootstrap error to its exit code.
pub fn for_error(err: &WorkerError) -> i32 {
    match err {
        WorkerError::Configuration(_) | WorkerError::Contract(_) | WorkerError::Load(_) => INVALID,
        WorkerError::Channel(_) | WorkerError::Environment(_) | WorkerError::Runner(_) => FAILED,
    }
}
