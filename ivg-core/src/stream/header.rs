//! Fixed 17-byte frame header.
//!
//! ## Wire format
//!
//! ```text
//! start_byte:   u8      (1)   0xA5
//! magic:        [u8; 3] (3)   "IVG"
//! version:      u8      (1)   1 (written, not checked on read)
//! frame_id:     u32     (4)
//! width:        u16     (2)
//! height:       u16     (2)
//! payload_len:  u32     (4)   bytes of run records that follow
//! ```
//!
//! All integers little-endian. The first four bytes double as the
//! resynchronisation marker; there is no escaping, so the same four
//! bytes may also occur inside a payload.

use crate::error::{IvgError, Result};

// ── Constants ────────────────────────────────────────────────────

pub const START_BYTE: u8 = 0xA5;
pub const MAGIC: [u8; 3] = *b"IVG";
pub const VERSION: u8 = 1;

/// `START_BYTE` followed by `MAGIC`.
pub const START_SEQUENCE: [u8; 4] = [START_BYTE, MAGIC[0], MAGIC[1], MAGIC[2]];

/// Encoded size of [`FrameHeader`].
pub const HEADER_SIZE: usize = 17;

pub type FrameHeaderBytes = [u8; HEADER_SIZE];

// ── FrameHeader ──────────────────────────────────────────────────

/// Per-frame metadata preceding every run-length payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_id: u32,
    pub width: u16,
    pub height: u16,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = HEADER_SIZE;

    pub fn new(frame_id: u32, width: u16, height: u16, payload_len: u32) -> Self {
        Self {
            frame_id,
            width,
            height,
            payload_len,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> FrameHeaderBytes {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&START_SEQUENCE);
        buf[4] = VERSION;
        buf[5..9].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[9..11].copy_from_slice(&self.width.to_le_bytes());
        buf[11..13].copy_from_slice(&self.height.to_le_bytes());
        buf[13..17].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Deserialize from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// Fails when the slice is short or the start sequence is wrong.
    /// The version byte is ignored, so headers from any sender revision
    /// unpack the same way.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let Some(raw) = data.get(..HEADER_SIZE) else {
            return Err(IvgError::InvalidHeader("shorter than 17 bytes"));
        };
        if raw[0..4] != START_SEQUENCE {
            return Err(IvgError::InvalidMagic);
        }
        Ok(Self {
            frame_id: u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]),
            width: u16::from_le_bytes([raw[9], raw[10]]),
            height: u16::from_le_bytes([raw[11], raw[12]]),
            payload_len: u32::from_le_bytes([raw[13], raw[14], raw[15], raw[16]]),
        })
    }

    /// Header plus payload length.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }

    /// Number of pixels the payload decodes into.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Pack a header in one call.
pub fn pack_header(frame_id: u32, width: u16, height: u16, payload_len: u32) -> FrameHeaderBytes {
    FrameHeader::new(frame_id, width, height, payload_len).encode()
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_little_endian() {
        let bytes = pack_header(0x0102_0304, 160, 120, 0x0A0B_0C0D);
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[0..4], &[0xA5, b'I', b'V', b'G']);
        assert_eq!(bytes[4], 1);
        assert_eq!(&bytes[5..9], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&bytes[9..11], &[160, 0]);
        assert_eq!(&bytes[11..13], &[120, 0]);
        assert_eq!(&bytes[13..17], &[0x0D, 0x0C, 0x0B, 0x0A]);
    }

    #[test]
    fn decode_reads_fields_back() {
        let hdr = FrameHeader::new(99, 320, 240, 7000);
        let decoded = FrameHeader::decode(&hdr.encode()).unwrap();
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.frame_len(), 7017);
        assert_eq!(decoded.pixel_count(), 76_800);
    }

    #[test]
    fn decode_too_short() {
        let short = [0xA5, b'I', b'V', b'G', 1, 0, 0];
        assert!(matches!(
            FrameHeader::decode(&short),
            Err(IvgError::InvalidHeader(_))
        ));
    }

    #[test]
    fn decode_bad_magic() {
        let mut bytes = pack_header(1, 1, 1, 0);
        bytes[2] = b'X';
        assert!(matches!(FrameHeader::decode(&bytes), Err(IvgError::InvalidMagic)));
    }

    #[test]
    fn decode_ignores_version_byte() {
        let mut bytes = pack_header(42, 2, 2, 7);
        bytes[4] = 2;
        assert_eq!(FrameHeader::decode(&bytes).unwrap(), FrameHeader::new(42, 2, 2, 7));
    }
}
