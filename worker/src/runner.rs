//! Runner capability contract and the handle used to invoke one.
//!
//! A runner module is the pluggable component that actually executes
//! tests. Modules are checked against the contract in two phases: the
//! default export and the channel-options capability at load time, the
//! execution capability immediately before invocation — channel and
//! environment setup happen in between, and the contract must still hold
//! at call time, so late-binding runners stay valid.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::core::types::WorkerContext;
use crate::rpc::RpcOptions;
use crate::rpc::transport::Transport;
use crate::state::ExecutionState;

/// A loaded runner module fails the required capability shape.
#[derive(Debug, Error)]
pub enum ContractViolation {
    #[error("runner module must expose a runner object as its default export, received {observed}")]
    MissingDefaultExport { observed: &'static str },
    #[error("runner module must expose a channel-options capability")]
    MissingRpcOptions,
    #[error("runner module must expose a test-execution capability")]
    MissingExecutor,
}

/// "Describe my channel options" capability. Pure function of the
/// context; building the channel from the result is the bootstrap's job.
pub trait RpcOptionsSource: Send + Sync {
    fn describe(&self, ctx: &WorkerContext) -> RpcOptions;
}

/// "Execute" capability. Consumes the assembled state and may suspend
/// arbitrarily long on controller traffic and user test code.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn run_tests(&self, state: ExecutionState) -> anyhow::Result<()>;
}

/// Capability surface a loaded runner module may provide.
///
/// Both accessors return `None` when the module does not carry the
/// capability; validation turns that into a [`ContractViolation`].
pub trait RunnerModule: Send + Sync {
    fn rpc_options(&self) -> Option<&dyn RpcOptionsSource>;
    fn executor(&self) -> Option<&dyn TestExecutor>;
}

/// Raw result of loading a module, before contract validation.
#[derive(Clone)]
pub struct LoadedModule {
    default_export: Option<ModuleExport>,
}

/// What a module exposed as its default export.
#[derive(Clone)]
pub enum ModuleExport {
    /// A runner object.
    Runner(Arc<dyn RunnerModule>),
    /// Any non-runner value, kept so violations can report what was
    /// actually seen.
    Value(Value),
}

impl LoadedModule {
    /// Module exposing `module` as its default export.
    pub fn runner(module: impl RunnerModule + 'static) -> Self {
        Self {
            default_export: Some(ModuleExport::Runner(Arc::new(module))),
        }
    }

    /// Module whose default export is a plain value (not a runner).
    pub fn value(value: Value) -> Self {
        Self {
            default_export: Some(ModuleExport::Value(value)),
        }
    }

    /// Module with no default export at all.
    pub fn empty() -> Self {
        Self {
            default_export: None,
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validated handle to a loaded runner module.
///
/// Loaded once per invocation; never cached across invocations by the
/// bootstrap.
pub struct RunnerHandle {
    module: Arc<dyn RunnerModule>,
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle").finish_non_exhaustive()
    }
}

impl RunnerHandle {
    /// First validation phase: the default export must be a runner
    /// object carrying the channel-options capability.
    pub fn validate(loaded: LoadedModule) -> Result<Self, ContractViolation> {
        let module = match loaded.default_export {
            None => {
                return Err(ContractViolation::MissingDefaultExport {
                    observed: "missing",
                });
            }
            Some(ModuleExport::Value(value)) => {
                return Err(ContractViolation::MissingDefaultExport {
                    observed: json_type_name(&value),
                });
            }
            Some(ModuleExport::Runner(module)) => module,
        };
        if module.rpc_options().is_none() {
            return Err(ContractViolation::MissingRpcOptions);
        }
        Ok(Self { module })
    }

    /// Channel options for this context, as the runner declares them.
    pub fn rpc_options(&self, ctx: &WorkerContext) -> Result<RpcOptions, ContractViolation> {
        let source = self
            .module
            .rpc_options()
            .ok_or(ContractViolation::MissingRpcOptions)?;
        Ok(source.describe(ctx))
    }

    /// Second validation phase, deferred until right before invocation.
    pub fn executor(&self) -> Result<&dyn TestExecutor, ContractViolation> {
        self.module
            .executor()
            .ok_or(ContractViolation::MissingExecutor)
    }
}

/// Built-in runner that satisfies the contract but executes nothing.
///
/// Registered at `builtin:noop` by the default registry. It opens a
/// stdio transport, so it only makes sense for process-isolated workers;
/// pools use it to smoke-check their spawning and channel plumbing.
pub struct NoopRunner;

impl RunnerModule for NoopRunner {
    fn rpc_options(&self) -> Option<&dyn RpcOptionsSource> {
        Some(&NoopRpcOptions)
    }

    fn executor(&self) -> Option<&dyn TestExecutor> {
        Some(&NoopExecutor)
    }
}

struct NoopRpcOptions;

impl RpcOptionsSource for NoopRpcOptions {
    fn describe(&self, _ctx: &WorkerContext) -> RpcOptions {
        RpcOptions::new(Transport::stdio())
    }
}

struct NoopExecutor;

#[async_trait]
impl TestExecutor for NoopExecutor {
    async fn run_tests(&self, state: ExecutionState) -> anyhow::Result<()> {
        info!(
            files = state.ctx.files.len(),
            environment = %state.environment.name,
            "noop runner: executing nothing"
        );
        Ok(())
    }
}
