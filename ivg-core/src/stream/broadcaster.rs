//! Sender-side fan-out of encoded frames.
//!
//! A [`StreamBroadcaster`] owns every outbound transport: TCP
//! subscribers accepted by a background task, plus at most one serial
//! sink. [`encode_and_broadcast`](StreamBroadcaster::encode_and_broadcast)
//! runs on the caller's task, encodes one frame and writes it to all of
//! them. Delivery is best effort: a subscriber whose write fails or
//! stalls past the write timeout is closed and dropped, the others are
//! unaffected.
//!
//! ```text
//! RgbFrame ─► FrameEncoder ─► Bytes ─┬─► subscriber 1 (TCP)
//!                                    ├─► subscriber N (TCP)
//!                                    └─► serial sink
//! ```

use std::io::{ErrorKind, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IvgError, Result};
use crate::stream::encoder::FrameEncoder;
use crate::stream::serial::{SerialConfig, SerialLink, SharedSerialBackend, system_backend};
use crate::stream::types::RgbFrame;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

// ── BroadcasterConfig ────────────────────────────────────────────

/// Configuration for [`StreamBroadcaster`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcasterConfig {
    /// TCP port to listen on; `None` disables the listener. Port 0
    /// binds an ephemeral port (see [`StreamBroadcaster::local_addr`]).
    pub port: Option<u16>,
    /// Interface to bind.
    pub bind_addr: IpAddr,
    /// Serial sink; `None` disables it.
    pub serial: Option<SerialConfig>,
    /// Longest a single subscriber write may take before the
    /// subscriber is dropped.
    pub write_timeout: Duration,
    /// Bounded wait for the accept task on `stop()`.
    pub join_timeout: Duration,
    /// Send black/white frames with this threshold instead of grayscale.
    pub monochrome: Option<u8>,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            port: None,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            serial: None,
            write_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(1),
            monochrome: None,
        }
    }
}

impl BroadcasterConfig {
    /// Listen on `port`, all interfaces.
    pub fn tcp(port: u16) -> Self {
        Self {
            port: Some(port),
            ..Self::default()
        }
    }

    /// Write to a serial sink only.
    pub fn serial(serial: SerialConfig) -> Self {
        Self {
            serial: Some(serial),
            ..Self::default()
        }
    }
}

// ── BroadcastReport ──────────────────────────────────────────────

/// Outcome of one [`StreamBroadcaster::encode_and_broadcast`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub frame_id: u32,
    /// Header + payload bytes.
    pub bytes: usize,
    /// TCP subscribers that took the whole frame.
    pub delivered: usize,
    /// TCP subscribers dropped during this pass.
    pub pruned: usize,
    /// Whether the serial sink took the whole frame.
    pub serial_written: bool,
}

// ── State ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterState {
    Idle,
    Running,
    Stopped,
}

struct Subscriber {
    peer: SocketAddr,
    stream: TcpStream,
}

type SubscriberSet = Arc<Mutex<Vec<Subscriber>>>;
type SerialSlot = Arc<std::sync::Mutex<Option<Box<dyn SerialLink>>>>;

// ── StreamBroadcaster ────────────────────────────────────────────

/// Encodes frames and fans them out to every attached transport.
///
/// # Lifetime
///
/// [`start`](Self::start) opens the configured transports,
/// [`stop`](Self::stop) closes them. Frames broadcast with nothing
/// attached (before `start`, or with no subscribers) are encoded,
/// numbered and dropped.
pub struct StreamBroadcaster {
    config: BroadcasterConfig,
    encoder: FrameEncoder,
    serial_backend: Option<SharedSerialBackend>,
    subscribers: SubscriberSet,
    serial: SerialSlot,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
    state: BroadcasterState,
}

impl StreamBroadcaster {
    /// Create a broadcaster using the serial backend compiled into this
    /// build, if any.
    pub fn new(config: BroadcasterConfig) -> Self {
        Self::with_serial_backend(config, system_backend())
    }

    /// Create a broadcaster with an explicit serial capability.
    pub fn with_serial_backend(
        config: BroadcasterConfig,
        serial_backend: Option<SharedSerialBackend>,
    ) -> Self {
        let encoder = FrameEncoder::new().monochrome(config.monochrome);
        Self {
            config,
            encoder,
            serial_backend,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            serial: Arc::new(std::sync::Mutex::new(None)),
            local_addr: None,
            accept_task: None,
            cancel: CancellationToken::new(),
            state: BroadcasterState::Idle,
        }
    }

    /// Open the listener and/or serial sink.
    ///
    /// Fails before touching the network when serial output is
    /// configured but no serial backend is available.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != BroadcasterState::Idle {
            return Err(IvgError::AlreadyStarted);
        }

        let serial_backend = match (&self.config.serial, &self.serial_backend) {
            (Some(cfg), None) => {
                return Err(IvgError::SerialUnavailable {
                    path: cfg.path.clone(),
                });
            }
            (Some(_), Some(backend)) => Some(Arc::clone(backend)),
            (None, _) => None,
        };

        if let Some(port) = self.config.port {
            let listener = TcpListener::bind((self.config.bind_addr, port)).await?;
            let addr = listener.local_addr()?;
            info!("stream listening on {addr}");

            self.local_addr = Some(addr);
            self.accept_task = Some(tokio::spawn(accept_loop(
                listener,
                Arc::clone(&self.subscribers),
                self.cancel.clone(),
            )));
        }

        if let (Some(cfg), Some(backend)) = (self.config.serial.clone(), serial_backend) {
            let link = match backend.open(&cfg) {
                Ok(link) => link,
                Err(e) => {
                    self.shutdown_accept().await;
                    self.local_addr = None;
                    self.cancel = CancellationToken::new();
                    return Err(e);
                }
            };
            *self.serial.lock().unwrap_or_else(PoisonError::into_inner) = Some(link);
            info!("serial sink attached: {} @ {} baud", cfg.path, cfg.baud_rate);
        }

        self.state = BroadcasterState::Running;
        Ok(())
    }

    /// Encode `frame` and write it to every attached transport.
    ///
    /// Only encoding problems are returned as errors; transport
    /// failures prune the failing transport and show up in the report.
    pub async fn encode_and_broadcast(&self, frame: &RgbFrame) -> Result<BroadcastReport> {
        let encoded = self.encoder.encode_frame(frame)?;
        let frame_id = encoded.header.frame_id;
        let data = encoded.to_bytes();

        let (delivered, pruned) = self.broadcast_tcp(&data).await;
        let serial_written = self.broadcast_serial(data.clone()).await;

        debug!(
            frame_id,
            bytes = data.len(),
            delivered,
            pruned,
            "frame broadcast"
        );

        Ok(BroadcastReport {
            frame_id,
            bytes: data.len(),
            delivered,
            pruned,
            serial_written,
        })
    }

    /// Write to all TCP subscribers concurrently, then drop the dead ones.
    async fn broadcast_tcp(&self, data: &Bytes) -> (usize, usize) {
        let write_timeout = self.config.write_timeout;
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.is_empty() {
            return (0, 0);
        }

        let writes = subscribers.iter_mut().map(|sub| async move {
            match tokio::time::timeout(write_timeout, sub.stream.write_all(data)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!(peer = %sub.peer, "subscriber write failed: {e}");
                    false
                }
                Err(_) => {
                    warn!(peer = %sub.peer, "subscriber write timed out after {write_timeout:?}");
                    false
                }
            }
        });
        let alive = join_all(writes).await;

        let before = subscribers.len();
        let mut flags = alive.into_iter();
        subscribers.retain(|sub| {
            let keep = flags.next().unwrap_or(false);
            if !keep {
                info!(peer = %sub.peer, "subscriber dropped");
            }
            keep
        });
        let pruned = before - subscribers.len();
        (subscribers.len(), pruned)
    }

    /// Write to the serial sink on the blocking pool.
    ///
    /// A write timeout loses the rest of this frame but keeps the sink;
    /// any other error detaches it.
    async fn broadcast_serial(&self, data: Bytes) -> bool {
        if self.config.serial.is_none() {
            return false;
        }
        let slot = Arc::clone(&self.serial);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(link) = guard.as_mut() else {
                return false;
            };
            match link.write_all(&data).and_then(|()| link.flush()) {
                Ok(()) => true,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    warn!("serial write incomplete, frame dropped: {e}");
                    false
                }
                Err(e) => {
                    warn!("serial write failed, detaching sink: {e}");
                    *guard = None;
                    false
                }
            }
        })
        .await;

        result.unwrap_or(false)
    }

    /// Stop accepting, close every subscriber and the serial sink.
    pub async fn stop(&mut self) {
        if self.state == BroadcasterState::Stopped {
            return;
        }

        self.shutdown_accept().await;

        let mut subscribers = self.subscribers.lock().await;
        for sub in subscribers.iter_mut() {
            let _ = sub.stream.shutdown().await;
        }
        subscribers.clear();
        drop(subscribers);

        let serial = Arc::clone(&self.serial);
        let _ = tokio::task::spawn_blocking(move || {
            let mut guard = serial.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(mut link) = guard.take() {
                let _ = link.flush();
            }
        })
        .await;

        self.state = BroadcasterState::Stopped;
        info!("stream broadcaster stopped");
    }

    /// Cancel the accept task and wait for it within the join timeout.
    async fn shutdown_accept(&mut self) {
        self.cancel.cancel();
        if let Some(mut handle) = self.accept_task.take() {
            if tokio::time::timeout(self.config.join_timeout, &mut handle)
                .await
                .is_err()
            {
                warn!("accept loop did not stop in time; aborting");
                handle.abort();
            }
        }
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Number of currently attached TCP subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }

    /// Whether a serial sink is attached.
    pub fn has_serial_sink(&self) -> bool {
        self.serial
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Id the next broadcast frame will carry.
    pub fn next_frame_id(&self) -> u32 {
        self.encoder.next_frame_id()
    }

    pub fn state(&self) -> BroadcasterState {
        self.state
    }
}

impl Drop for StreamBroadcaster {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ── Accept loop ──────────────────────────────────────────────────

async fn accept_loop(listener: TcpListener, subscribers: SubscriberSet, cancel: CancellationToken) {
    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            result = listener.accept() => result,
        };

        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                continue;
            }
        };

        // Frames are latency-bound; never let Nagle hold one back.
        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, "failed to set TCP_NODELAY: {e}");
        }

        subscribers.lock().await.push(Subscriber { peer, stream });
        info!(%peer, "subscriber attached");
    }
    debug!("accept loop stopped");
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::framer::extract_frames_from;
    use crate::stream::serial::tests::MemorySerial;
    use tokio::io::AsyncReadExt;

    fn test_frame(seed: u8) -> RgbFrame {
        let data = (0..8 * 4 * 3).map(|i| seed.wrapping_add(i as u8 / 9)).collect();
        RgbFrame::rgb(8, 4, data).unwrap()
    }

    async fn wait_for_subscribers(b: &StreamBroadcaster, n: usize) {
        for _ in 0..200 {
            if b.subscriber_count().await >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscribers never attached");
    }

    #[tokio::test]
    async fn frames_without_transports_still_advance_id() {
        let b = StreamBroadcaster::with_serial_backend(BroadcasterConfig::default(), None);
        for expected in 0..3 {
            let report = b.encode_and_broadcast(&test_frame(1)).await.unwrap();
            assert_eq!(report.frame_id, expected);
            assert_eq!(report.delivered, 0);
            assert!(!report.serial_written);
        }
        assert_eq!(b.next_frame_id(), 3);
    }

    #[tokio::test]
    async fn serial_without_backend_is_config_error() {
        let cfg = BroadcasterConfig::serial(SerialConfig::new("/dev/ttyUSB0"));
        let mut b = StreamBroadcaster::with_serial_backend(cfg, None);
        let err = b.start().await.unwrap_err();
        assert!(matches!(err, IvgError::SerialUnavailable { .. }));
        assert!(err.is_config());
        assert_eq!(b.state(), BroadcasterState::Idle);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let mut b = StreamBroadcaster::with_serial_backend(BroadcasterConfig::default(), None);
        b.start().await.unwrap();
        assert!(matches!(b.start().await, Err(IvgError::AlreadyStarted)));
        b.stop().await;
        assert_eq!(b.state(), BroadcasterState::Stopped);
    }

    #[tokio::test]
    async fn serial_sink_receives_frames() {
        let mem = MemorySerial::default();
        let cfg = BroadcasterConfig::serial(SerialConfig::new("mem"));
        let backend: SharedSerialBackend = Arc::new(mem.clone());
        let mut b = StreamBroadcaster::with_serial_backend(cfg, Some(backend));
        b.start().await.unwrap();
        assert!(b.has_serial_sink());

        let r1 = b.encode_and_broadcast(&test_frame(10)).await.unwrap();
        let r2 = b.encode_and_broadcast(&test_frame(90)).await.unwrap();
        assert!(r1.serial_written && r2.serial_written);

        let written = mem.written.lock().unwrap().clone();
        assert_eq!(written.len(), r1.bytes + r2.bytes);
        let (frames, rest) = extract_frames_from(&written);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].frame_id, 1);
        assert!(rest.is_empty());

        b.stop().await;
        assert!(!b.has_serial_sink());
    }

    #[tokio::test]
    async fn tcp_subscriber_gets_frame_and_dead_one_is_pruned() {
        let mut b = StreamBroadcaster::with_serial_backend(BroadcasterConfig::tcp(0), None);
        b.start().await.unwrap();
        let port = b.local_addr().unwrap().port();

        let mut live = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let dead = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        wait_for_subscribers(&b, 2).await;

        let report = b.encode_and_broadcast(&test_frame(3)).await.unwrap();
        assert_eq!(report.delivered, 2);

        let mut buf = vec![0u8; report.bytes];
        live.read_exact(&mut buf).await.unwrap();
        let (frames, _) = extract_frames_from(&buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_id, 0);

        // A closed peer surfaces as a write error within a few sends.
        drop(dead);
        let mut pruned = 0;
        for _ in 0..50 {
            let report = b.encode_and_broadcast(&test_frame(4)).await.unwrap();
            pruned += report.pruned;
            if pruned > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(pruned, 1);
        assert_eq!(b.subscriber_count().await, 1);

        b.stop().await;
        assert_eq!(b.subscriber_count().await, 0);
    }
}
