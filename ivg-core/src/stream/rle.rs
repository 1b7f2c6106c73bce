//! Run-length payload codec.
//!
//! ## Wire format
//!
//! A payload is a concatenation of 7-byte run records (little-endian):
//! ```text
//! offset:  u32  (4)   pixel index of the first pixel in the run
//! value:   u8   (1)   gray intensity
//! length:  u16  (2)   pixels covered, 1..=65535
//! ```
//!
//! Decoding replays records onto a zero-filled buffer, so pixels no
//! record covers come out black.

use bytes::{BufMut, BytesMut};

// ── Constants ────────────────────────────────────────────────────

/// Longest run a single record can describe.
pub const MAX_RUN: usize = u16::MAX as usize;

/// Default cut-off for [`encode_runs_monochrome`].
pub const DEFAULT_MONO_THRESHOLD: u8 = 128;

// ── RunRecord ────────────────────────────────────────────────────

/// One `(offset, value, length)` span of identical gray intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRecord {
    pub offset: u32,
    pub value: u8,
    pub length: u16,
}

impl RunRecord {
    /// Encoded size on the wire.
    pub const SIZE: usize = 7;

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4] = self.value;
        buf[5..7].copy_from_slice(&self.length.to_le_bytes());
        buf
    }

    /// Deserialize from the first [`Self::SIZE`] bytes of `data`.
    ///
    /// Returns `None` when fewer bytes are available.
    pub fn decode(data: &[u8]) -> Option<Self> {
        let rec: &[u8; Self::SIZE] = data.get(..Self::SIZE)?.try_into().ok()?;
        Some(Self {
            offset: u32::from_le_bytes([rec[0], rec[1], rec[2], rec[3]]),
            value: rec[4],
            length: u16::from_le_bytes([rec[5], rec[6]]),
        })
    }
}

/// Iterate over the complete run records in a payload.
///
/// A trailing fragment shorter than [`RunRecord::SIZE`] is ignored.
pub fn runs(payload: &[u8]) -> impl Iterator<Item = RunRecord> + '_ {
    payload.chunks_exact(RunRecord::SIZE).filter_map(RunRecord::decode)
}

// ── Encoding ─────────────────────────────────────────────────────

/// Length of the run of `gray[start]` beginning at `start`, capped at
/// [`MAX_RUN`].
fn run_length(gray: &[u8], start: usize) -> usize {
    let current = gray[start];
    let limit = (gray.len() - start).min(MAX_RUN);
    gray[start..start + limit]
        .iter()
        .take_while(|&&v| v == current)
        .count()
}

/// Greedily split `gray` into run records covering every byte exactly once.
pub fn encode_runs(gray: &[u8]) -> BytesMut {
    let mut payload = BytesMut::new();
    let mut idx = 0;
    while idx < gray.len() {
        let len = run_length(gray, idx);
        put_run(&mut payload, idx, gray[idx], len);
        idx += len;
    }
    payload
}

/// Two-level encoding: pixels at or above `threshold` become 255 and
/// only those runs are emitted; everything else decodes to 0.
pub fn encode_runs_monochrome(gray: &[u8], threshold: u8) -> BytesMut {
    let mut payload = BytesMut::new();
    let mut idx = 0;
    while idx < gray.len() {
        let set = gray[idx] >= threshold;
        let limit = (gray.len() - idx).min(MAX_RUN);
        let len = gray[idx..idx + limit]
            .iter()
            .take_while(|&&v| (v >= threshold) == set)
            .count();
        if set {
            put_run(&mut payload, idx, u8::MAX, len);
        }
        idx += len;
    }
    payload
}

fn put_run(payload: &mut BytesMut, offset: usize, value: u8, len: usize) {
    payload.put_u32_le(offset as u32);
    payload.put_u8(value);
    payload.put_u16_le(len as u16);
}

// ── Decoding ─────────────────────────────────────────────────────

/// Rebuild a gray buffer of exactly `pixel_count` bytes from `payload`.
///
/// Records that start past the end, or that clip to nothing, are
/// skipped; records running past the end are clipped. Decoding stops
/// quietly at a trailing partial record.
pub fn decode_payload(payload: &[u8], pixel_count: usize) -> Vec<u8> {
    let mut gray = vec![0u8; pixel_count];
    for run in runs(payload) {
        let offset = run.offset as usize;
        let end = offset.saturating_add(run.length as usize).min(pixel_count);
        if offset >= pixel_count || offset >= end {
            continue;
        }
        gray[offset..end].fill(run.value);
    }
    gray
}

// ── Tests ────────────────────────────────────────────────────────
