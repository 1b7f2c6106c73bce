//! Shared frame types for the streaming pipeline.
//!
//! [`RgbFrame`] is what the frame source hands to the sender;
//! [`DecodedFrame`] is what extraction hands back to the viewer.

use crate::error::{IvgError, Result};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Red, Green, Blue.
    #[default]
    Rgb8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 => 3,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub(crate) const fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => (0, 1, 2),
            PixelFormat::Bgra8 => (2, 1, 0),
        }
    }
}

// ── RgbFrame ─────────────────────────────────────────────────────

/// A rendered, uncompressed frame as produced by the frame source.
///
/// Rows are tightly packed: `data` holds exactly
/// `width * height * bytes_per_pixel` bytes.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl RgbFrame {
    /// Wrap a pixel buffer, checking that its length matches the layout.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(IvgError::InvalidPixelBuffer {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Shorthand for a packed RGB triplet buffer.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgb8, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

// ── DecodedFrame ─────────────────────────────────────────────────

/// A frame reconstructed from the wire.
///
/// `gray` always holds exactly `width * height` bytes, whatever the
/// payload contained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub frame_id: u32,
    pub width: u16,
    pub height: u16,
    pub gray: Vec<u8>,
}

impl DecodedFrame {
    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Gray value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u16, y: u16) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.gray
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Expand to packed RGB triplets for display layers.
    pub fn to_rgb(&self) -> Vec<u8> {
        self.gray.iter().flat_map(|&g| [g, g, g]).collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────
