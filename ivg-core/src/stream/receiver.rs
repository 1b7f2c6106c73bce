//! Receiver-side frame reconstruction.
//!
//! A [`StreamReceiver`] owns one inbound transport (TCP or serial). A
//! background read loop pushes raw chunks into a channel; the viewer
//! calls [`poll`](StreamReceiver::poll) at its own cadence, which
//! drains the channel without blocking, appends to the accumulation
//! buffer and extracts every complete frame.
//!
//! ```text
//! transport ─► read loop ─► mpsc<Bytes> ─► poll() ─► BytesMut ─► framer ─► Vec<DecodedFrame>
//! ```

use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{IvgError, Result};
use crate::stream::framer::extract_frames;
use crate::stream::serial::{SerialConfig, SerialLink, SharedSerialBackend, system_backend};
use crate::stream::types::DecodedFrame;

/// Largest single read handed to the queue.
pub const DEFAULT_READ_CHUNK: usize = 4096;

// ── ReceiverConfig ───────────────────────────────────────────────

/// Configuration for [`StreamReceiver`]. Exactly one of `port` and
/// `serial` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Host to connect to when `port` is set.
    pub host: String,
    pub port: Option<u16>,
    pub serial: Option<SerialConfig>,
    pub connect_timeout: Duration,
    /// Bytes requested per read.
    pub read_chunk_size: usize,
    /// Sleep between empty serial reads.
    pub idle_backoff: Duration,
    /// Bounded wait for the read loop on `stop()`.
    pub join_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: None,
            serial: None,
            connect_timeout: Duration::from_secs(5),
            read_chunk_size: DEFAULT_READ_CHUNK,
            idle_backoff: Duration::from_millis(10),
            join_timeout: Duration::from_secs(1),
        }
    }
}

impl ReceiverConfig {
    /// Read from a TCP broadcaster.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port: Some(port),
            ..Self::default()
        }
    }

    /// Read from a serial line.
    pub fn serial(serial: SerialConfig) -> Self {
        Self {
            serial: Some(serial),
            ..Self::default()
        }
    }

    /// Check that exactly one endpoint is configured.
    pub fn validate(&self) -> Result<()> {
        match (self.port, &self.serial) {
            (None, None) => Err(IvgError::MissingEndpoint),
            (Some(_), Some(_)) => Err(IvgError::ConflictingEndpoints),
            _ if self.read_chunk_size == 0 => {
                Err(IvgError::InvalidConfig("read_chunk_size must be non-zero".into()))
            }
            _ => Ok(()),
        }
    }
}

// ── State ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Idle,
    Connected,
    Stopped,
}

// ── StreamReceiver ───────────────────────────────────────────────

/// Single-transport consumer that turns raw bytes back into frames.
pub struct StreamReceiver {
    config: ReceiverConfig,
    serial_backend: Option<SharedSerialBackend>,
    chunk_rx: Option<mpsc::UnboundedReceiver<Bytes>>,
    buffer: BytesMut,
    read_task: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    state: ReceiverState,
}

impl StreamReceiver {
    /// Create a receiver using the serial backend compiled into this
    /// build, if any.
    pub fn new(config: ReceiverConfig) -> Self {
        Self::with_serial_backend(config, system_backend())
    }

    /// Create a receiver with an explicit serial capability.
    pub fn with_serial_backend(
        config: ReceiverConfig,
        serial_backend: Option<SharedSerialBackend>,
    ) -> Self {
        Self {
            config,
            serial_backend,
            chunk_rx: None,
            buffer: BytesMut::new(),
            read_task: None,
            alive: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            state: ReceiverState::Idle,
        }
    }

    /// Open the transport and launch the read loop.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != ReceiverState::Idle {
            return Err(IvgError::AlreadyStarted);
        }
        self.config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let chunk_size = self.config.read_chunk_size;
        let cancel = self.cancel.clone();
        let alive = Arc::clone(&self.alive);

        let task = if let Some(port) = self.config.port {
            let stream = self.connect_tcp(port).await?;
            alive.store(true, Ordering::SeqCst);
            tokio::spawn(tcp_read_loop(stream, tx, cancel, chunk_size, alive))
        } else if let Some(serial) = &self.config.serial {
            let Some(backend) = &self.serial_backend else {
                return Err(IvgError::SerialUnavailable {
                    path: serial.path.clone(),
                });
            };
            let link = backend.open(serial)?;
            info!("reading stream from serial {} @ {} baud", serial.path, serial.baud_rate);
            let backoff = self.config.idle_backoff;
            alive.store(true, Ordering::SeqCst);
            tokio::task::spawn_blocking(move || {
                serial_read_loop(link, tx, cancel, chunk_size, backoff, alive)
            })
        } else {
            return Err(IvgError::MissingEndpoint);
        };

        self.chunk_rx = Some(rx);
        self.read_task = Some(task);
        self.state = ReceiverState::Connected;
        Ok(())
    }

    async fn connect_tcp(&self, port: u16) -> Result<TcpStream> {
        let host = self.config.host.as_str();
        let timeout = self.config.connect_timeout;

        info!("connecting to stream at {host}:{port}");
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| IvgError::Timeout(timeout))??;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Drain queued bytes and return every frame completed so far.
    ///
    /// Never blocks. Frames come back in stream order; several may
    /// arrive at once if polls are infrequent. Returns nothing before
    /// `start()`.
    pub fn poll(&mut self) -> Vec<DecodedFrame> {
        let Some(rx) = self.chunk_rx.as_mut() else {
            return Vec::new();
        };
        while let Ok(chunk) = rx.try_recv() {
            self.buffer.extend_from_slice(&chunk);
        }
        if self.buffer.is_empty() {
            return Vec::new();
        }

        let frames = extract_frames(&mut self.buffer);
        if !frames.is_empty() {
            debug!(
                count = frames.len(),
                pending = self.buffer.len(),
                "frames extracted"
            );
        }
        frames
    }

    /// Stop the read loop and close the transport.
    pub async fn stop(&mut self) {
        if self.state == ReceiverState::Stopped {
            return;
        }
        self.cancel.cancel();

        if let Some(mut handle) = self.read_task.take() {
            if tokio::time::timeout(self.config.join_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("read loop did not stop in time; aborting");
                handle.abort();
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        self.state = ReceiverState::Stopped;
        info!("stream receiver stopped");
    }

    /// Whether the read loop is still delivering bytes. Once false,
    /// further polls only drain what was already queued.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Bytes held back for the next poll.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }
}

impl Drop for StreamReceiver {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Read loops ───────────────────────────────────────────────────

async fn tcp_read_loop(
    mut stream: TcpStream,
    tx: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    chunk_size: usize,
    alive: Arc<AtomicBool>,
) {
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            result = stream.read(&mut chunk) => result,
        };

        match read {
            Ok(0) => {
                info!("stream closed by peer");
                break;
            }
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&chunk[..n])).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("stream read failed: {e}");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("tcp read loop stopped");
}

fn serial_read_loop(
    mut link: Box<dyn SerialLink>,
    tx: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    chunk_size: usize,
    backoff: Duration,
    alive: Arc<AtomicBool>,
) {
    let mut chunk = vec![0u8; chunk_size];
    while !cancel.is_cancelled() {
        match link.read(&mut chunk) {
            Ok(0) => std::thread::sleep(backoff),
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&chunk[..n])).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                std::thread::sleep(backoff)
            }
            Err(e) => {
                error!("serial read failed: {e}");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
    debug!("serial read loop stopped");
}

// ── Tests ────────────────────────────────────────────────────────
