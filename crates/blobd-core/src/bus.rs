//! Local pub/sub bus over a Unix socket.
//!
//! Protocol: one message per line, `<topic> <payload>` (payload may be empty).
//! Lines from any client are funnelled into one channel so the dispatcher sees
//! them sequentially; every published message is fanned out to all clients.

use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};

use crate::publisher::{Transport, TransportError};

/// Capacity of the outbound fan-out channel; slow subscribers miss older messages.
const OUTBOUND_CAPACITY: usize = 256;

/// One message on a topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Parses a protocol line. Returns `None` for blank lines.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = line.trim_start();
        if line.trim().is_empty() {
            return None;
        }
        match line.split_once(' ') {
            Some((topic, payload)) => Some(Self::new(topic, payload.as_bytes())),
            None => Some(Self::new(line.trim_end(), Vec::new())),
        }
    }

    /// Encodes as a protocol line, including the trailing newline.
    pub fn to_line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(self.topic.len() + self.payload.len() + 2);
        line.extend_from_slice(self.topic.as_bytes());
        line.push(b' ');
        line.extend_from_slice(&self.payload);
        line.push(b'\n');
        line
    }
}

/// Outbound half of the bus; cheap to clone.
#[derive(Debug, Clone)]
pub struct LocalBus {
    outbound: broadcast::Sender<BusMessage>,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        let (outbound, _) = broadcast::channel(OUTBOUND_CAPACITY);
        Self { outbound }
    }

    /// Receiver of everything published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.outbound.subscribe()
    }
}

impl Transport for LocalBus {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if payload.contains(&b'\n') {
            return Err(TransportError::Other(
                "payload must not contain newlines".to_string(),
            ));
        }
        // No subscribers is not an error: the message is simply not observed.
        let _ = self.outbound.send(BusMessage::new(topic, payload));
        Ok(())
    }
}

/// Binds `path` and spawns a task that serves bus clients.
///
/// Inbound lines are forwarded to `inbound`; messages published on `bus` are
/// written to every connected client. A stale socket file at `path` is replaced.
pub fn spawn_listener(
    bus: &LocalBus,
    path: impl AsRef<Path>,
    inbound: mpsc::Sender<BusMessage>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir: {}", parent.display()))?;
    }
    let _ = std::fs::remove_file(&path);
    let listener = UnixListener::bind(&path)
        .with_context(|| format!("bind bus socket: {}", path.display()))?;
    tracing::info!(path = %path.display(), "bus listening");

    let bus = bus.clone();
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let inbound = inbound.clone();
                    let outbound = bus.subscribe();
                    tokio::spawn(serve_client(stream, inbound, outbound));
                }
                Err(e) => tracing::debug!("bus accept: {}", e),
            }
        }
    });
    Ok(handle)
}

async fn serve_client(
    stream: UnixStream,
    inbound: mpsc::Sender<BusMessage>,
    mut outbound: broadcast::Receiver<BusMessage>,
) {
    let (read_half, mut write_half) = stream.into_split();
    let writer = tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(msg) => {
                    if write_half.write_all(&msg.to_line()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "bus subscriber lagging; dropped messages");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(msg) = BusMessage::parse_line(&line) else {
                    continue;
                };
                tracing::debug!(topic = %msg.topic, bytes = msg.payload.len(), "bus message received");
                if inbound.send(msg).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("bus client read: {}", e);
                break;
            }
        }
    }
    writer.abort();
}

/// Sends one message to the bus at `socket_path`.
pub async fn send(socket_path: &Path, topic: &str, payload: &[u8]) -> Result<()> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("connect to bus at {}", socket_path.display()))?;
    stream
        .write_all(&BusMessage::new(topic, payload).to_line())
        .await?;
    stream.shutdown().await?;
    Ok(())
}

/// Connected reader of everything published on the bus.
pub struct BusSubscription {
    lines: Lines<BufReader<UnixStream>>,
}

impl BusSubscription {
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(socket_path)
            .await
            .with_context(|| format!("connect to bus at {}", socket_path.display()))?;
        Ok(Self {
            lines: BufReader::new(stream).lines(),
        })
    }

    /// Next message, or `None` when the bus goes away.
    pub async fn next(&mut self) -> Result<Option<BusMessage>> {
        while let Some(line) = self.lines.next_line().await? {
            if let Some(msg) = BusMessage::parse_line(&line) {
                return Ok(Some(msg));
            }
        }
        Ok(None)
    }
}
