//! Bootstrap and teardown of one worker invocation.
//!
//! Every pool-spawned isolation unit runs [`run`] exactly once. The
//! phases are strictly sequential: arm instrumentation, tag identity,
//! resolve the runner, open the controller channel, construct the
//! sandbox, assemble the execution state, invoke the runner. No two
//! suspension points overlap; cancellation arrives asynchronously over
//! the channel and is only ever *observed* by the runner, never enforced
//! here.
//!
//! Teardown is unconditional: the channel is drained and the inspection
//! hook restored on every exit path — success, error, or cancellation —
//! and only then is the primary error re-raised.

use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::core::identity::WorkerIdentity;
use crate::core::types::WorkerContext;
use crate::env;
use crate::error::WorkerError;
use crate::io::config::{ResolvedConfig, WorkerOptions, resolve_config};
use crate::io::inspect::{self, InspectorGuard};
use crate::io::loader::{self, RunnerLoader};
use crate::rpc::RpcChannel;
use crate::state::{ExecutionState, StageTimings};

/// Reversal actions accumulated while the phases acquire resources.
///
/// Registered in acquisition order, run in reverse at teardown: the
/// channel drains first, instrumentation restores last.
struct Teardown {
    inspector: InspectorGuard,
    channel: Option<RpcChannel>,
}

impl Teardown {
    fn new(inspector: InspectorGuard) -> Self {
        Self {
            inspector,
            channel: None,
        }
    }

    /// Hand the channel over for teardown; the phases keep using it by
    /// reference so it stays alive until the drain has run.
    fn attach_channel(&mut self, channel: RpcChannel) -> &RpcChannel {
        self.channel.insert(channel)
    }

    /// Drain the channel, then restore instrumentation. Drain failures
    /// are logged and discarded so they never mask the primary outcome.
    async fn finish(mut self) {
        if let Some(channel) = self.channel.take() {
            if let Err(err) = channel.drain_handle().settled().await {
                debug!(err = %err, "discarding channel drain failure");
            }
        }
        self.inspector.restore();
    }
}

/// Bootstrap one worker invocation and guarantee teardown.
///
/// Resolves with `Ok(())` on success, or with the first fatal error —
/// in both cases only after the channel has drained and instrumentation
/// has been reversed. Nothing is retried here; respawning is the pool
/// manager's decision.
#[instrument(skip_all, fields(worker_id = ctx.worker_id, pool_id = ctx.pool_id))]
pub async fn run(
    ctx: WorkerContext,
    loader: &dyn RunnerLoader,
    options: &WorkerOptions,
) -> Result<(), WorkerError> {
    let prepare_started = Instant::now();
    let config = resolve_config(&ctx.config, options)?;
    let identity = WorkerIdentity::from_context(&ctx);

    let mut teardown = Teardown::new(inspect::arm(&config, identity));
    if let Some(label) = identity.process_label(ctx.isolation) {
        info!(label = %label, "tagged worker process");
    }

    let outcome = run_phases(&ctx, loader, &config, prepare_started, &mut teardown).await;
    teardown.finish().await;
    outcome
}

async fn run_phases(
    ctx: &WorkerContext,
    loader: &dyn RunnerLoader,
    config: &ResolvedConfig,
    prepare_started: Instant,
    teardown: &mut Teardown,
) -> Result<(), WorkerError> {
    let runner = loader::resolve(loader, &ctx.runner).await?;

    let channel = RpcChannel::open(runner.rpc_options(ctx)?, config).await?;
    let channel = teardown.attach_channel(channel);
    let rpc = channel.handle();

    let environment_started = Instant::now();
    let mut environment = env::load_environment(ctx, &rpc).await?;
    if let Some(mode) = ctx.environment.transform_mode {
        environment.transform_mode = mode;
    }

    let state = ExecutionState::assemble(
        ctx.clone(),
        config.clone(),
        environment,
        channel,
        StageTimings {
            prepare_started,
            environment_started,
        },
    );

    // The execution capability is checked only now: channel and
    // environment must exist before a late-binding runner can be
    // invoked, and the contract must still hold at call time.
    let executor = runner.executor()?;
    debug!(files = ctx.files.len(), "invoking runner");
    executor.run_tests(state).await.map_err(WorkerError::Runner)
}
