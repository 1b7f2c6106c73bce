//! Frame extraction from a growing, possibly corrupted byte buffer.
//!
//! Bytes arrive in arbitrary chunks. The framer scans for the start
//! sequence, checks the header behind it and slices out complete
//! frames. Anything that does not parse is skipped one byte at a time
//! until the next start sequence; incomplete frames stay in the buffer
//! until more bytes arrive.
//!
//! After each decoded frame the consumed prefix is dropped and the scan
//! starts again at offset 0 of what is left, so no cursor has to
//! survive between calls.

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::stream::header::{FrameHeader, HEADER_SIZE, START_SEQUENCE};
use crate::stream::rle::decode_payload;
use crate::stream::types::DecodedFrame;

/// Bytes kept when no start sequence is found: enough for a marker
/// split across two chunks, never enough to hold a whole one.
const MARKER_TAIL: usize = START_SEQUENCE.len() - 1;

/// Index of the next start sequence at or after `from`.
pub fn find_start(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .windows(START_SEQUENCE.len())
        .position(|w| w == START_SEQUENCE)
        .map(|pos| pos + from)
}

/// Pull the next complete frame out of `buffer`.
///
/// On `Some`, the frame and everything before it have been removed.
/// On `None`, `buffer` has been trimmed to the bytes that may still
/// become part of a frame:
///
/// - no start sequence: the last (up to) three bytes;
/// - a start sequence with an incomplete header or payload: everything
///   from that start sequence on.
pub fn next_frame(buffer: &mut BytesMut) -> Option<DecodedFrame> {
    let mut search_from = 0;
    loop {
        let Some(start) = find_start(buffer, search_from) else {
            let keep = buffer.len().min(MARKER_TAIL);
            buffer.advance(buffer.len() - keep);
            return None;
        };

        if buffer.len() < start + HEADER_SIZE {
            buffer.advance(start);
            return None;
        }

        let header = match FrameHeader::decode(&buffer[start..]) {
            Ok(h) => h,
            Err(e) => {
                trace!(offset = start, "skipping false start sequence: {e}");
                search_from = start + 1;
                continue;
            }
        };

        let total = header.frame_len();
        if buffer.len() - start < total {
            buffer.advance(start);
            return None;
        }

        if start > 0 {
            trace!(skipped = start, "resynchronised on start sequence");
        }
        buffer.advance(start);
        let frame = buffer.split_to(total);
        let gray = decode_payload(&frame[HEADER_SIZE..], header.pixel_count());

        return Some(DecodedFrame {
            frame_id: header.frame_id,
            width: header.width,
            height: header.height,
            gray,
        });
    }
}

/// Pull every complete frame out of `buffer`, in stream order.
///
/// On return `buffer` holds the remainder described in [`next_frame`].
pub fn extract_frames(buffer: &mut BytesMut) -> Vec<DecodedFrame> {
    let mut frames = Vec::new();
    while let Some(frame) = next_frame(buffer) {
        frames.push(frame);
    }
    frames
}

/// Slice-based form of [`extract_frames`]: returns the frames and the
/// remainder to prepend to the next chunk.
pub fn extract_frames_from(data: &[u8]) -> (Vec<DecodedFrame>, Vec<u8>) {
    let mut buffer = BytesMut::from(data);
    let frames = extract_frames(&mut buffer);
    (frames, buffer.to_vec())
}

// ── Tests ────────────────────────────────────────────────────────
