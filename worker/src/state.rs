//! The execution state handed to the runner.

use std::time::Instant;

use serde_json::Value;

use crate::core::cache::{MockRegistry, ModuleCacheMap};
use crate::core::types::WorkerContext;
use crate::env::SandboxEnvironment;
use crate::io::config::ResolvedConfig;
use crate::rpc::{CancelReceiver, RpcChannel, RpcHandle};

/// Timestamps captured at the phase boundaries of one invocation.
#[derive(Debug, Clone, Copy)]
pub struct StageTimings {
    /// Captured on entry, before anything is set up.
    pub prepare_started: Instant,
    /// Captured immediately before environment construction begins.
    pub environment_started: Instant,
}

/// Aggregate state handed to the runner's execution capability.
///
/// Assembled exactly once per invocation; the bootstrap never touches it
/// again after handoff. The runner owns the nested maps and may keep
/// them across invocations if it deliberately opts out of isolation.
pub struct ExecutionState {
    pub ctx: WorkerContext,
    /// Fresh per invocation. The context's `invalidates` list names
    /// entries the runner must evict if it carried a cache over.
    pub module_cache: ModuleCacheMap,
    pub mocks: MockRegistry,
    pub config: ResolvedConfig,
    /// Cooperative cancellation signal the runner must observe.
    pub on_cancel: CancelReceiver,
    pub environment: SandboxEnvironment,
    pub timings: StageTimings,
    pub rpc: RpcHandle,
    /// Opaque payload from the pool, forwarded unchanged.
    pub provided_context: Value,
}

impl ExecutionState {
    /// Build the state for one invocation.
    pub fn assemble(
        ctx: WorkerContext,
        config: ResolvedConfig,
        environment: SandboxEnvironment,
        channel: &RpcChannel,
        timings: StageTimings,
    ) -> Self {
        let rpc = channel.handle();
        let on_cancel = rpc.cancel_receiver();
        let provided_context = ctx.provided_context.clone();
        Self {
            ctx,
            module_cache: ModuleCacheMap::new(),
            mocks: MockRegistry::new(),
            config,
            on_cancel,
            environment,
            timings,
            rpc,
            provided_context,
        }
    }
}
