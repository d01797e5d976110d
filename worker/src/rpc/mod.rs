//! Duplex rpc channel to the controlling process.
//!
//! Built from the options a runner module declares. The channel exposes
//! a clonable request surface for the runner, a cooperative cancellation
//! consumer fed by controller `Cancel` frames, and a drain handle that
//! is awaited during teardown so no in-flight operation is dropped.
//!
//! Opening the channel is purely transport setup; nothing is sent to the
//! controller until the first request.

pub mod messages;
pub mod transport;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::io::config::ResolvedConfig;
use crate::rpc::messages::{CancelReason, WireFrame};
use crate::rpc::transport::{BoxSink, BoxSource, Transport};

/// Channel establishment or request failure.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel to controller closed")]
    Closed,
    #[error("request {method:?} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("controller rejected {method:?}: {reason}")]
    Rejected { method: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed frame: {0}")]
    Codec(String),
}

/// Failure while flushing in-flight operations during teardown.
///
/// Never fatal to the invocation: the bootstrap logs and discards it so
/// the primary outcome is preserved.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("channel drain timed out after {timeout:?} with {in_flight} operations in flight")]
    Timeout { timeout: Duration, in_flight: usize },
}

/// Options a runner module declares for its channel.
pub struct RpcOptions {
    pub transport: Transport,
    /// Overrides the resolved configuration's request timeout.
    pub request_timeout: Option<Duration>,
}

impl RpcOptions {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }
}

/// Locks without propagating poisoning; the maps stay usable even if a
/// holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-flight accounting shared by handles and the drain.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn begin(self: Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard { pending: self }
    }

    async fn wait_idle(&self) {
        loop {
            // Register interest before re-checking the count so a
            // decrement between the check and the await cannot be lost.
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.count.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Marks one operation settled on every path, including caller-side
/// timeout or drop.
struct InFlightGuard {
    pending: Arc<Pending>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.pending.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.pending.idle.notify_waiters();
        }
    }
}

enum Command {
    Request {
        method: String,
        params: Value,
        responder: oneshot::Sender<Result<Value, ChannelError>>,
    },
}

/// Requests awaiting a controller reply. `closed` flips (under the same
/// lock) when the inbound half dies, so registration and close-out
/// cannot race: a request either lands in the map and is settled by the
/// final drain, or observes `closed` and fails immediately.
#[derive(Default)]
struct Replies {
    closed: bool,
    map: HashMap<u64, (String, oneshot::Sender<Result<Value, ChannelError>>)>,
}

type ReplyMap = Arc<Mutex<Replies>>;

/// Clonable request surface handed to the runner and the environment
/// loader.
#[derive(Clone)]
pub struct RpcHandle {
    commands: mpsc::Sender<Command>,
    pending: Arc<Pending>,
    cancel: watch::Receiver<Option<CancelReason>>,
    request_timeout: Duration,
}

impl RpcHandle {
    /// Issue a request and await the controller's reply.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ChannelError> {
        let _in_flight = Arc::clone(&self.pending).begin();
        let (responder, reply) = oneshot::channel();
        self.commands
            .send(Command::Request {
                method: method.to_string(),
                params,
                responder,
            })
            .await
            .map_err(|_| ChannelError::Closed)?;
        match tokio::time::timeout(self.request_timeout, reply).await {
            Err(_) => Err(ChannelError::Timeout {
                method: method.to_string(),
                timeout: self.request_timeout,
            }),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Ok(Ok(outcome)) => outcome,
        }
    }

    /// Cancellation consumer fed by controller `Cancel` frames.
    pub fn cancel_receiver(&self) -> CancelReceiver {
        CancelReceiver {
            rx: self.cancel.clone(),
        }
    }
}

/// Cooperative cancellation signal.
///
/// The bootstrap never acts on this itself; it hands the consumer to the
/// runner, which must observe it and wind down.
#[derive(Clone)]
pub struct CancelReceiver {
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CancelReceiver {
    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the controller cancels. Pends forever if it never
    /// does; callers race this against their own work.
    pub async fn cancelled(&mut self) -> CancelReason {
        loop {
            if let Some(reason) = *self.rx.borrow_and_update() {
                return reason;
            }
            if self.rx.changed().await.is_err() {
                // Channel gone without a cancel; nothing will ever fire.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Completion handle for teardown: resolves once every in-flight
/// operation has settled, successfully or not.
pub struct DrainHandle {
    pending: Arc<Pending>,
    timeout: Duration,
}

impl DrainHandle {
    pub async fn settled(self) -> Result<(), DrainError> {
        match tokio::time::timeout(self.timeout, self.pending.wait_idle()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(DrainError::Timeout {
                timeout: self.timeout,
                in_flight: self.pending.count.load(Ordering::Acquire),
            }),
        }
    }
}

/// The built channel. Owned by the bootstrap for the invocation; the
/// runner only ever sees [`RpcHandle`] and [`CancelReceiver`].
pub struct RpcChannel {
    handle: RpcHandle,
    pending: Arc<Pending>,
    drain_timeout: Duration,
    outbound: JoinHandle<()>,
    inbound: JoinHandle<()>,
}

impl RpcChannel {
    /// Establish the channel from the declared options.
    pub async fn open(options: RpcOptions, config: &ResolvedConfig) -> Result<Self, ChannelError> {
        let request_timeout = options.request_timeout.unwrap_or(config.request_timeout);
        let Transport { sink, source } = options.transport;

        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = watch::channel(None);
        let pending = Arc::new(Pending::default());
        let replies: ReplyMap = Arc::new(Mutex::new(Replies::default()));

        let outbound = tokio::spawn(run_outbound(sink, commands_rx, Arc::clone(&replies)));
        let inbound = tokio::spawn(run_inbound(source, replies, cancel_tx));

        Ok(Self {
            handle: RpcHandle {
                commands: commands_tx,
                pending: Arc::clone(&pending),
                cancel: cancel_rx,
                request_timeout,
            },
            pending,
            drain_timeout: config.drain_timeout,
            outbound,
            inbound,
        })
    }

    pub fn handle(&self) -> RpcHandle {
        self.handle.clone()
    }

    /// Drain completion handle, registered for teardown as soon as the
    /// channel exists.
    pub fn drain_handle(&self) -> DrainHandle {
        DrainHandle {
            pending: Arc::clone(&self.pending),
            timeout: self.drain_timeout,
        }
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.outbound.abort();
        self.inbound.abort();
    }
}

async fn run_outbound(mut sink: BoxSink, mut commands: mpsc::Receiver<Command>, replies: ReplyMap) {
    let mut next_id: u64 = 0;
    while let Some(Command::Request {
        method,
        params,
        responder,
    }) = commands.recv().await
    {
        next_id += 1;
        let id = next_id;
        {
            // Register before sending so a fast reply cannot race the
            // map; fail immediately if the inbound half already died.
            let mut replies = lock(&replies);
            if replies.closed {
                let _ = responder.send(Err(ChannelError::Closed));
                continue;
            }
            replies.map.insert(id, (method.clone(), responder));
        }
        if let Err(err) = sink
            .send(WireFrame::Request { id, method, params })
            .await
            && let Some((_, responder)) = lock(&replies).map.remove(&id)
        {
            let _ = responder.send(Err(err));
        }
    }
}

async fn run_inbound(
    mut source: BoxSource,
    replies: ReplyMap,
    cancel_tx: watch::Sender<Option<CancelReason>>,
) {
    loop {
        match source.recv().await {
            Ok(Some(WireFrame::Response { id, result, error })) => {
                let Some((method, responder)) = lock(&replies).map.remove(&id) else {
                    debug!(id, "response for unknown request");
                    continue;
                };
                let outcome = match error {
                    Some(reason) => Err(ChannelError::Rejected { method, reason }),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = responder.send(outcome);
            }
            Ok(Some(WireFrame::Cancel { reason })) => {
                debug!(?reason, "controller cancelled the run");
                let _ = cancel_tx.send(Some(reason));
            }
            Ok(Some(WireFrame::Request { id, method, .. })) => {
                debug!(id, method = %method, "ignoring controller-initiated request");
            }
            Ok(None) => break,
            Err(err) => {
                warn!(err = %err, "transport receive failed");
                break;
            }
        }
    }
    // Peer gone: refuse new registrations and settle anything still
    // waiting so drain cannot hang.
    let mut replies = lock(&replies);
    replies.closed = true;
    for (_, (_, responder)) in replies.map.drain() {
        let _ = responder.send(Err(ChannelError::Closed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{WorkerOptions, resolve_config};
    use crate::rpc::transport::Transport;
    use serde_json::json;

    fn config() -> ResolvedConfig {
        resolve_config(&crate::core::types::TestConfig::default(), &WorkerOptions::default())
            .expect("resolve config")
    }

    fn short_drain_config() -> ResolvedConfig {
        let mut config = config();
        config.request_timeout = Duration::from_millis(200);
        config.drain_timeout = Duration::from_millis(100);
        config
    }

    async fn answer_next(controller: &mut Transport, result: Value) {
        let frame = controller
            .source
            .recv()
            .await
            .expect("controller recv")
            .expect("frame");
        let WireFrame::Request { id, .. } = frame else {
            panic!("expected request, got {frame:?}");
        };
        controller
            .sink
            .send(WireFrame::Response {
                id,
                result: Some(result),
                error: None,
            })
            .await
            .expect("controller send");
    }

    #[tokio::test]
    async fn request_round_trips_through_the_controller() {
        let (worker_end, mut controller) = Transport::pair(8);
        let channel = RpcChannel::open(RpcOptions::new(worker_end), &config())
            .await
            .expect("open");
        let handle = channel.handle();

        let controller_task = tokio::spawn(async move {
            answer_next(&mut controller, json!({"ok": true})).await;
        });

        let reply = handle.request("ping", json!(null)).await.expect("reply");
        assert_eq!(reply, json!({"ok": true}));
        controller_task.await.expect("controller task");

        channel.drain_handle().settled().await.expect("drain");
    }

    #[tokio::test]
    async fn error_response_becomes_rejected() {
        let (worker_end, mut controller) = Transport::pair(8);
        let channel = RpcChannel::open(RpcOptions::new(worker_end), &config())
            .await
            .expect("open");
        let handle = channel.handle();

        tokio::spawn(async move {
            let frame = controller
                .source
                .recv()
                .await
                .expect("recv")
                .expect("frame");
            let WireFrame::Request { id, .. } = frame else {
                panic!("expected request");
            };
            controller
                .sink
                .send(WireFrame::Response {
                    id,
                    result: None,
                    error: Some("nope".to_string()),
                })
                .await
                .expect("send");
        });

        let err = handle
            .request("resolve_environment", json!({}))
            .await
            .expect_err("must reject");
        assert!(
            matches!(&err, ChannelError::Rejected { method, reason }
                if method == "resolve_environment" && reason == "nope")
        );

        channel.drain_handle().settled().await.expect("drain");
    }

    #[tokio::test]
    async fn drain_settles_after_failed_and_timed_out_requests() {
        let (worker_end, controller) = Transport::pair(8);
        let channel = RpcChannel::open(RpcOptions::new(worker_end), &short_drain_config())
            .await
            .expect("open");
        let handle = channel.handle();

        // Controller never answers; the request times out, settles its
        // in-flight slot, and drain completes anyway.
        let err = handle
            .request("ping", json!(null))
            .await
            .expect_err("must time out");
        assert!(matches!(err, ChannelError::Timeout { .. }));

        channel.drain_handle().settled().await.expect("drain");
        drop(controller);
    }

    #[tokio::test]
    async fn drain_times_out_while_an_operation_hangs() {
        let (worker_end, _controller) = Transport::pair(8);
        let mut config = short_drain_config();
        config.request_timeout = Duration::from_secs(60);
        let channel = RpcChannel::open(RpcOptions::new(worker_end), &config)
            .await
            .expect("open");
        let handle = channel.handle();

        let in_flight = tokio::spawn(async move { handle.request("ping", json!(null)).await });
        tokio::task::yield_now().await;

        let err = channel
            .drain_handle()
            .settled()
            .await
            .expect_err("drain must time out");
        assert!(matches!(err, DrainError::Timeout { in_flight: 1, .. }));
        in_flight.abort();
    }

    #[tokio::test]
    async fn cancel_frame_feeds_the_receiver() {
        let (worker_end, mut controller) = Transport::pair(8);
        let channel = RpcChannel::open(RpcOptions::new(worker_end), &config())
            .await
            .expect("open");
        let mut on_cancel = channel.handle().cancel_receiver();
        assert!(!on_cancel.is_cancelled());

        controller
            .sink
            .send(WireFrame::Cancel {
                reason: CancelReason::TestFailure,
            })
            .await
            .expect("send cancel");

        assert_eq!(on_cancel.cancelled().await, CancelReason::TestFailure);
        assert!(on_cancel.is_cancelled());
    }

    #[tokio::test]
    async fn runner_declared_timeout_overrides_the_config() {
        let (worker_end, _controller) = Transport::pair(8);
        let options =
            RpcOptions::new(worker_end).with_request_timeout(Duration::from_millis(50));
        let channel = RpcChannel::open(options, &config()).await.expect("open");

        let err = channel
            .handle()
            .request("ping", json!(null))
            .await
            .expect_err("must time out fast");
        assert!(matches!(
            err,
            ChannelError::Timeout { timeout, .. } if timeout == Duration::from_millis(50)
        ));
    }
}
