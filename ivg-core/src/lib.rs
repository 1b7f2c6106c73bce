//! # ivg-core
//!
//! Core library for the IVG grayscale frame stream.
//!
//! This crate contains:
//! - **Pixel pipeline**: RGB → grayscale conversion and run-length payloads (`stream::grayscale`, `stream::rle`)
//! - **Framer**: the 17-byte `FrameHeader` and resynchronising frame extraction (`stream::header`, `stream::framer`)
//! - **Broadcaster**: `StreamBroadcaster`, best-effort fan-out to TCP subscribers and a serial sink
//! - **Receiver**: `StreamReceiver`, a background read loop plus non-blocking `poll`
//! - **Codec adapter**: `IvgCodec` for `tokio_util::codec::FramedRead`
//! - **Error**: `IvgError`, a typed `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod stream;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::IvgCodec;
pub use error::{IvgError, Result};
pub use stream::{
    BroadcastReport, BroadcasterConfig, DecodedFrame, EncodedFrame, FrameEncoder, FrameHeader,
    HEADER_SIZE, PixelFormat, ReceiverConfig, RgbFrame, START_SEQUENCE, SerialConfig,
    StreamBroadcaster, StreamReceiver,
};
