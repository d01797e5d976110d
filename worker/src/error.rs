//! Typed failure taxonomy for one worker invocation.
//!
//! Every fatal error bypasses the remaining setup phases but still
//! reaches teardown before being surfaced, so instrumentation and the
//! controller channel are never left dangling. Nothing in this taxonomy
//! is retried here; respawning is the pool manager's call.

use thiserror::Error;

use crate::env::EnvironmentError;
use crate::io::loader::LoadError;
use crate::rpc::ChannelError;
use crate::runner::ContractViolation;

/// Invalid or unsupported input from the pool.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("path to the test runner cannot be relative, received {locator:?}")]
    RelativeRunnerLocator { locator: String },
    #[error("invalid worker options: {reason}")]
    InvalidOptions { reason: String },
}

/// First fatal error of a worker invocation, surfaced after teardown.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to establish controller channel: {0}")]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error("test runner failed: {0:#}")]
    Runner(anyhow::Error),
}
