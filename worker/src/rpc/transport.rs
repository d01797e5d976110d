//! Transport seam under the rpc channel.
//!
//! The runner module decides how its worker talks to the controller: a
//! process-isolated worker uses its own stdio, thread workers and tests
//! use an in-memory pair. The channel drives the two halves from
//! separate tasks so a slow reader can never deadlock the writer.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::mpsc;

use crate::rpc::ChannelError;
use crate::rpc::messages::WireFrame;

/// Outbound frame half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: WireFrame) -> Result<(), ChannelError>;
}

/// Inbound frame half of a transport. `Ok(None)` means the peer closed.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Result<Option<WireFrame>, ChannelError>;
}

pub type BoxSink = Box<dyn FrameSink>;
pub type BoxSource = Box<dyn FrameSource>;

/// A connected duplex transport, as declared by the runner module.
pub struct Transport {
    pub sink: BoxSink,
    pub source: BoxSource,
}

impl Transport {
    /// JSON lines over this process's stdin/stdout, for workers spawned
    /// as child processes of the pool. stdout belongs to the channel;
    /// diagnostics must go to stderr.
    pub fn stdio() -> Self {
        Self {
            sink: Box::new(StdioSink {
                writer: tokio::io::stdout(),
            }),
            source: Box::new(StdioSource {
                reader: BufReader::new(tokio::io::stdin()),
            }),
        }
    }

    /// In-memory duplex pair: `(worker_end, controller_end)`.
    pub fn pair(capacity: usize) -> (Transport, Transport) {
        let (worker_tx, controller_rx) = mpsc::channel(capacity);
        let (controller_tx, worker_rx) = mpsc::channel(capacity);
        let worker = Transport {
            sink: Box::new(PipeSink { tx: worker_tx }),
            source: Box::new(PipeSource { rx: worker_rx }),
        };
        let controller = Transport {
            sink: Box::new(PipeSink { tx: controller_tx }),
            source: Box::new(PipeSource { rx: controller_rx }),
        };
        (worker, controller)
    }
}

struct PipeSink {
    tx: mpsc::Sender<WireFrame>,
}

#[async_trait]
impl FrameSink for PipeSink {
    async fn send(&mut self, frame: WireFrame) -> Result<(), ChannelError> {
        self.tx.send(frame).await.map_err(|_| ChannelError::Closed)
    }
}

struct PipeSource {
    rx: mpsc::Receiver<WireFrame>,
}

#[async_trait]
impl FrameSource for PipeSource {
    async fn recv(&mut self) -> Result<Option<WireFrame>, ChannelError> {
        Ok(self.rx.recv().await)
    }
}

struct StdioSink {
    writer: Stdout,
}

#[async_trait]
impl FrameSink for StdioSink {
    async fn send(&mut self, frame: WireFrame) -> Result<(), ChannelError> {
        let mut line =
            serde_json::to_string(&frame).map_err(|err| ChannelError::Codec(err.to_string()))?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|err| ChannelError::Transport(err.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|err| ChannelError::Transport(err.to_string()))
    }
}

struct StdioSource {
    reader: BufReader<Stdin>,
}

#[async_trait]
impl FrameSource for StdioSource {
    async fn recv(&mut self) -> Result<Option<WireFrame>, ChannelError> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|err| ChannelError::Transport(err.to_string()))?;
            if read == 0 {
                return Ok(None);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .map(Some)
                .map_err(|err| ChannelError::Codec(err.to_string()));
        }
    }
}
