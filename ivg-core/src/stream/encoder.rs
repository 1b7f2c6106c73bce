//! Sender-side frame encoder.
//!
//! Turns an [`RgbFrame`] into one wire frame (header + run-length
//! payload) and owns the frame id sequence.

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{IvgError, Result};
use crate::stream::grayscale::frame_to_grayscale;
use crate::stream::header::{FrameHeader, HEADER_SIZE};
use crate::stream::rle::{encode_runs, encode_runs_monochrome};
use crate::stream::types::RgbFrame;

// ── EncodedFrame ─────────────────────────────────────────────────

/// A frame ready for transmission.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub header: FrameHeader,
    /// Run-length payload, `header.payload_len` bytes.
    pub payload: Bytes,
}

impl EncodedFrame {
    /// Total bytes on the wire.
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Header followed by payload, as one contiguous buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        self.write_to(&mut buf);
        buf.freeze()
    }

    pub(crate) fn write_to(&self, dst: &mut BytesMut) {
        dst.reserve(self.wire_len());
        dst.put_slice(&self.header.encode());
        dst.put_slice(&self.payload);
    }
}

// ── FrameEncoder ─────────────────────────────────────────────────

/// Grayscale run-length encoder with a wrapping frame counter.
///
/// The counter advances once per successful [`encode`](Self::encode),
/// whether or not anyone receives the frame.
#[derive(Debug, Default)]
pub struct FrameEncoder {
    next_id: AtomicU32,
    /// When set, frames are sent two-level with this cut-off.
    monochrome: Option<u8>,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `frame_id` instead of 0.
    pub fn with_frame_id(frame_id: u32) -> Self {
        Self {
            next_id: AtomicU32::new(frame_id),
            monochrome: None,
        }
    }

    /// Switch to black/white runs with the given threshold.
    pub fn monochrome(mut self, threshold: Option<u8>) -> Self {
        self.monochrome = threshold;
        self
    }

    /// Id the next successful encode will carry.
    pub fn next_frame_id(&self) -> u32 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Encode a frame and advance the id.
    pub fn encode_frame(&self, frame: &RgbFrame) -> Result<EncodedFrame> {
        let (width, height) = match (u16::try_from(frame.width()), u16::try_from(frame.height())) {
            (Ok(w), Ok(h)) => (w, h),
            _ => {
                return Err(IvgError::DimensionsTooLarge {
                    width: frame.width(),
                    height: frame.height(),
                });
            }
        };

        let gray = frame_to_grayscale(frame)?;
        let payload = match self.monochrome {
            Some(threshold) => encode_runs_monochrome(&gray, threshold),
            None => encode_runs(&gray),
        };
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            IvgError::InvalidConfig(format!("payload of {} bytes exceeds u32", payload.len()))
        })?;

        // Atomic add wraps at u32::MAX.
        let frame_id = self.next_id.fetch_add(1, Ordering::SeqCst);

        Ok(EncodedFrame {
            header: FrameHeader::new(frame_id, width, height, payload_len),
            payload: payload.freeze(),
        })
    }

    /// Encode a frame straight to wire bytes.
    pub fn encode(&self, frame: &RgbFrame) -> Result<Bytes> {
        self.encode_frame(frame).map(|f| f.to_bytes())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::framer::extract_frames_from;
    use crate::stream::grayscale::grayscale;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> RgbFrame {
        let data = rgb.repeat((width * height) as usize);
        RgbFrame::rgb(width, height, data).unwrap()
    }

    #[test]
    fn ids_start_at_zero_and_increase() {
        let enc = FrameEncoder::new();
        let frame = solid(4, 4, [1, 2, 3]);
        for expected in 0..5u32 {
            let f = enc.encode_frame(&frame).unwrap();
            assert_eq!(f.header.frame_id, expected);
        }
        assert_eq!(enc.next_frame_id(), 5);
    }

    #[test]
    fn ids_wrap_modulo_u32() {
        let enc = FrameEncoder::with_frame_id(u32::MAX - 1);
        let frame = solid(1, 1, [0, 0, 0]);
        let ids: Vec<u32> = (0..3)
            .map(|_| enc.encode_frame(&frame).unwrap().header.frame_id)
            .collect();
        assert_eq!(ids, vec![u32::MAX - 1, u32::MAX, 0]);
        assert_eq!(enc.next_frame_id(), 1);
    }

    #[test]
    fn failed_encode_keeps_id() {
        let enc = FrameEncoder::new();
        let wide = RgbFrame::rgb(70_000, 1, vec![0; 70_000 * 3]).unwrap();
        assert!(matches!(
            enc.encode(&wide),
            Err(IvgError::DimensionsTooLarge { width: 70_000, .. })
        ));
        assert_eq!(enc.next_frame_id(), 0);
    }

    #[test]
    fn encoded_bytes_extract_back() {
        let rgb: Vec<u8> = (0..6 * 5 * 3).map(|i| (i * 7 % 256) as u8).collect();
        let frame = RgbFrame::rgb(6, 5, rgb.clone()).unwrap();
        let enc = FrameEncoder::new();
        let bytes = enc.encode(&frame).unwrap();

        let (frames, rest) = extract_frames_from(&bytes);
        assert!(rest.is_empty());
        assert_eq!(frames.len(), 1);
        assert_eq!((frames[0].width, frames[0].height), (6, 5));
        assert_eq!(frames[0].gray, grayscale(&rgb).unwrap());
    }

    #[test]
    fn monochrome_frames_are_two_level() {
        let mut rgb = [200u8, 200, 200].repeat(4);
        rgb.extend([10u8, 10, 10].repeat(4));
        let frame = RgbFrame::rgb(4, 2, rgb).unwrap();
        let enc = FrameEncoder::new().monochrome(Some(128));

        let (frames, _) = extract_frames_from(&enc.encode(&frame).unwrap());
        assert_eq!(frames[0].gray, vec![255, 255, 255, 255, 0, 0, 0, 0]);
    }
}
