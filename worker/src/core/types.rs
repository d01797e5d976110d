//! Shared deterministic types for the worker core.
//!
//! These types define the contract between the pool manager and one
//! worker invocation. They must stay stable and serializable: the pool
//! writes them, the worker reads them, and test code builds them
//! directly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Isolation unit a worker invocation runs in.
///
/// Process-isolated workers get a human-readable process label and talk
/// to the pool over their own stdio; thread workers share the pool
/// process and use in-memory transports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationUnit {
    #[default]
    Thread,
    Process,
}

/// How sources are compiled for the selected environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformMode {
    /// Server-side rendition of modules.
    Ssr,
    /// Browser-like rendition of modules.
    Web,
}

/// Environment selection forwarded by the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentOptions {
    /// Environment name; resolved by the controller, not the worker.
    pub name: String,
    /// When set, overrides the transform mode the resolved environment
    /// chose for itself.
    #[serde(default)]
    pub transform_mode: Option<TransformMode>,
    /// Opaque environment options passed through to the controller.
    #[serde(default)]
    pub options: Value,
}

/// Test configuration as supplied by the pool.
///
/// Unset fields fall back to the worker-side options file; the merge
/// happens in [`crate::io::config::resolve_config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Project name, used in log output only.
    pub name: Option<String>,
    /// Project root the runner should operate in.
    pub root: Option<PathBuf>,
    /// Arm the inspection hook for this invocation.
    pub inspect: bool,
    /// Wall-clock budget for one controller request, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Budget for flushing in-flight channel operations at teardown.
    pub drain_timeout_secs: Option<u64>,
}

/// Everything the pool hands one worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerContext {
    /// Ordinal of this worker within the run (1-indexed by convention).
    pub worker_id: u32,
    /// Identity of the pool slot executing this invocation.
    pub pool_id: u32,
    /// Locator of the runner module: an absolute path or a URL.
    /// Relative paths are rejected before any load is attempted.
    pub runner: String,
    #[serde(default)]
    pub config: TestConfig,
    /// Test files assigned to this invocation.
    #[serde(default)]
    pub files: Vec<String>,
    /// Module ids whose cached entries the runner must invalidate
    /// before executing.
    #[serde(default)]
    pub invalidates: Vec<String>,
    pub environment: EnvironmentOptions,
    /// Opaque payload forwarded to the runner unchanged.
    #[serde(default)]
    pub provided_context: Value,
    #[serde(default)]
    pub isolation: IsolationUnit,
}
