//! Test-only helpers: deterministic contexts, scripted runner modules,
//! and a loopback controller for driving the bootstrap end to end
//! without a real pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

use crate::core::types::{
    EnvironmentOptions, IsolationUnit, TestConfig, TransformMode, WorkerContext,
};
use crate::rpc::RpcOptions;
use crate::rpc::messages::{CancelReason, WireFrame};
use crate::rpc::transport::Transport;
use crate::runner::{RpcOptionsSource, RunnerModule, TestExecutor};
use crate::state::ExecutionState;

/// Deterministic context pointing at `locator`.
pub fn context(locator: &str) -> WorkerContext {
    WorkerContext {
        worker_id: 1,
        pool_id: 3,
        runner: locator.to_string(),
        config: TestConfig::default(),
        files: vec!["tests/example.rs".to_string()],
        invalidates: Vec::new(),
        environment: EnvironmentOptions {
            name: "node".to_string(),
            transform_mode: None,
            options: Value::Null,
        },
        provided_context: json!({"seed": 7}),
        isolation: IsolationUnit::Thread,
    }
}

/// What the loopback controller should do.
#[derive(Debug, Clone)]
pub struct ControllerScript {
    /// Reply for `resolve_environment`; `Err` becomes an error response.
    pub environment: Result<Value, String>,
    /// Cancel reason to send right after answering the first request.
    pub cancel_after_first: Option<CancelReason>,
}

impl Default for ControllerScript {
    fn default() -> Self {
        Self {
            environment: Ok(json!({"transform_mode": "ssr", "options": {}})),
            cancel_after_first: None,
        }
    }
}

/// Frames the loopback controller received, for assertions.
pub type RecordedFrames = Arc<Mutex<Vec<WireFrame>>>;

/// Method names of the recorded request frames, in arrival order.
pub fn recorded_methods(frames: &RecordedFrames) -> Vec<String> {
    frames
        .lock()
        .expect("frames lock")
        .iter()
        .filter_map(|frame| match frame {
            WireFrame::Request { method, .. } => Some(method.clone()),
            _ => None,
        })
        .collect()
}

/// Spawn an in-memory controller. Returns the worker-side transport,
/// the frames the controller receives, and the controller task handle.
pub fn loopback(script: ControllerScript) -> (Transport, RecordedFrames, JoinHandle<()>) {
    let (worker_end, controller_end) = Transport::pair(16);
    let frames: RecordedFrames = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&frames);

    let task = tokio::spawn(async move {
        let Transport {
            mut sink,
            mut source,
        } = controller_end;
        let mut cancel_pending = script.cancel_after_first;

        while let Ok(Some(frame)) = source.recv().await {
            recorded.lock().expect("frames lock").push(frame.clone());
            let WireFrame::Request { id, method, .. } = frame else {
                continue;
            };
            let response = match (method.as_str(), &script.environment) {
                ("resolve_environment", Ok(reply)) => WireFrame::Response {
                    id,
                    result: Some(reply.clone()),
                    error: None,
                },
                ("resolve_environment", Err(reason)) => WireFrame::Response {
                    id,
                    result: None,
                    error: Some(reason.clone()),
                },
                _ => WireFrame::Response {
                    id,
                    result: Some(Value::Null),
                    error: None,
                },
            };
            if sink.send(response).await.is_err() {
                break;
            }
            if let Some(reason) = cancel_pending.take()
                && sink.send(WireFrame::Cancel { reason }).await.is_err()
            {
                break;
            }
        }
    });

    (worker_end, frames, task)
}

/// Observations a scripted executor records when invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSeen {
    pub worker_id: u32,
    pub environment_name: String,
    pub transform_mode: TransformMode,
    pub provided_context: Value,
    pub cancelled_with: Option<CancelReason>,
    /// Both per-invocation maps arrived fresh.
    pub fresh_caches: bool,
    /// The environment timestamp was captured at or after prepare.
    pub timings_ordered: bool,
}

pub type SeenHandle = Arc<Mutex<Option<ExecutionSeen>>>;

/// Executor with scripted behavior, recording what it was handed.
pub struct ScriptedExecutor {
    fail_with: Option<String>,
    await_cancel: bool,
    seen: SeenHandle,
}

impl ScriptedExecutor {
    pub fn succeed() -> (Self, SeenHandle) {
        Self::new(None, false)
    }

    pub fn fail(message: &str) -> (Self, SeenHandle) {
        Self::new(Some(message.to_string()), false)
    }

    /// Waits for controller cancellation before returning.
    pub fn await_cancel() -> (Self, SeenHandle) {
        Self::new(None, true)
    }

    fn new(fail_with: Option<String>, await_cancel: bool) -> (Self, SeenHandle) {
        let seen: SeenHandle = Arc::new(Mutex::new(None));
        (
            Self {
                fail_with,
                await_cancel,
                seen: Arc::clone(&seen),
            },
            seen,
        )
    }
}

#[async_trait]
impl TestExecutor for ScriptedExecutor {
    async fn run_tests(&self, state: ExecutionState) -> anyhow::Result<()> {
        let mut on_cancel = state.on_cancel.clone();
        let cancelled_with = if self.await_cancel {
            Some(on_cancel.cancelled().await)
        } else {
            on_cancel.reason()
        };
        *self.seen.lock().expect("seen lock") = Some(ExecutionSeen {
            worker_id: state.ctx.worker_id,
            environment_name: state.environment.name.clone(),
            transform_mode: state.environment.transform_mode,
            provided_context: state.provided_context.clone(),
            cancelled_with,
            fresh_caches: state.module_cache.is_empty(),
            timings_ordered: state.timings.environment_started >= state.timings.prepare_started,
        });
        match &self.fail_with {
            Some(message) => Err(anyhow::anyhow!("{message}")),
            None => Ok(()),
        }
    }
}

/// Runner module with selectable capabilities for contract tests.
pub struct ScriptedRunner {
    transport: Mutex<Option<Transport>>,
    provide_rpc_options: bool,
    executor: Option<ScriptedExecutor>,
}

impl ScriptedRunner {
    /// Runner with both capabilities, talking over `transport`.
    pub fn new(transport: Transport, executor: ScriptedExecutor) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            provide_rpc_options: true,
            executor: Some(executor),
        }
    }

    /// Runner missing the channel-options capability.
    pub fn without_rpc_options(executor: ScriptedExecutor) -> Self {
        Self {
            transport: Mutex::new(None),
            provide_rpc_options: false,
            executor: Some(executor),
        }
    }

    /// Runner missing the execution capability.
    pub fn without_executor(transport: Transport) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            provide_rpc_options: true,
            executor: None,
        }
    }
}

impl RunnerModule for ScriptedRunner {
    fn rpc_options(&self) -> Option<&dyn RpcOptionsSource> {
        self.provide_rpc_options.then_some(self as &dyn RpcOptionsSource)
    }

    fn executor(&self) -> Option<&dyn TestExecutor> {
        self.executor
            .as_ref()
            .map(|executor| executor as &dyn TestExecutor)
    }
}

impl RpcOptionsSource for ScriptedRunner {
    fn describe(&self, _ctx: &WorkerContext) -> RpcOptions {
        let transport = self
            .transport
            .lock()
            .expect("transport lock")
            .take()
            .expect("transport already taken");
        RpcOptions::new(transport)
    }
}
