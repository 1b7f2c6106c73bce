//! # IVG grayscale frame stream
//!
//! A lightweight protocol for pushing rendered frames to viewers over
//! byte streams that may deliver data in arbitrary chunks (TCP sockets,
//! serial lines).
//!
//! ## Architecture
//!
//! ```text
//! SENDER                                         RECEIVER
//! ┌──────────────────────────┐                  ┌──────────────────────────┐
//! │ RgbFrame                 │                  │ read loop (task/thread)  │
//! │   ↓ grayscale            │                  │   ↓ mpsc<Bytes>          │
//! │   ↓ rle::encode_runs     │   TCP / serial   │ StreamReceiver::poll     │
//! │   ↓ FrameHeader::encode  │ ───────────────► │   ↓ framer::extract      │
//! │ StreamBroadcaster        │                  │   ↓ rle::decode_payload  │
//! │   (fan-out, prune)       │                  │ Vec<DecodedFrame>        │
//! └──────────────────────────┘                  └──────────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `types`       | Input pixel buffer and decoded frame types           |
//! | `grayscale`   | RGB → 8-bit luma                                     |
//! | `rle`         | Run records, run-length encode / decode              |
//! | `header`      | 17-byte frame header and start sequence              |
//! | `framer`      | Start-sequence scan and frame extraction with resync |
//! | `encoder`     | Sender pipeline with the wrapping frame id           |
//! | `serial`      | Injected serial capability                           |
//! | `broadcaster` | TCP accept loop and best-effort fan-out              |
//! | `receiver`    | Single-transport read loop and `poll`                |

pub mod broadcaster;
pub mod encoder;
pub mod framer;
pub mod grayscale;
pub mod header;
pub mod receiver;
pub mod rle;
pub mod serial;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use broadcaster::{BroadcastReport, BroadcasterConfig, BroadcasterState, StreamBroadcaster};
pub use encoder::{EncodedFrame, FrameEncoder};
pub use framer::{extract_frames, extract_frames_from, find_start, next_frame};
pub use grayscale::{grayscale, to_grayscale};
pub use header::{FrameHeader, HEADER_SIZE, START_SEQUENCE, pack_header};
pub use receiver::{ReceiverConfig, ReceiverState, StreamReceiver};
pub use rle::{RunRecord, decode_payload, encode_runs, encode_runs_monochrome};
pub use serial::{SerialBackend, SerialConfig, SerialLink, SharedSerialBackend};
pub use types::{DecodedFrame, PixelFormat, RgbFrame};
