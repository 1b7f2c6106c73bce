//! RGB → 8-bit luma conversion.
//!
//! Uses the fixed Rec. 601 weights `0.299 R + 0.587 G + 0.114 B`,
//! evaluated in `f64` in that order and truncated toward zero.

use crate::error::{IvgError, Result};
use crate::stream::types::{PixelFormat, RgbFrame};

const WEIGHT_R: f64 = 0.299;
const WEIGHT_G: f64 = 0.587;
const WEIGHT_B: f64 = 0.114;

/// Luma of a single pixel.
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    // `as u8` saturates, so a sum that rounds to 255.000…1 stays 255.
    (WEIGHT_R * r as f64 + WEIGHT_G * g as f64 + WEIGHT_B * b as f64) as u8
}

/// Convert packed RGB triplets to one gray byte per pixel.
///
/// The input length must be a multiple of 3.
pub fn grayscale(rgb: &[u8]) -> Result<Vec<u8>> {
    to_grayscale(rgb, PixelFormat::Rgb8)
}

/// Convert a buffer in any supported [`PixelFormat`] to gray bytes.
pub fn to_grayscale(data: &[u8], format: PixelFormat) -> Result<Vec<u8>> {
    let bpp = format.bytes_per_pixel();
    if data.len() % bpp != 0 {
        return Err(IvgError::InvalidPixelBuffer {
            expected: data.len() - data.len() % bpp,
            actual: data.len(),
        });
    }

    let (ri, gi, bi) = format.rgb_offsets();
    Ok(data
        .chunks_exact(bpp)
        .map(|px| luma(px[ri], px[gi], px[bi]))
        .collect())
}

/// Convert a whole frame.
pub fn frame_to_grayscale(frame: &RgbFrame) -> Result<Vec<u8>> {
    to_grayscale(frame.data(), frame.format())
}
