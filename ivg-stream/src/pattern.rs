//! Synthetic frame source for `serve` mode.
//!
//! Draws a diagonal gradient with a bright vertical bar that sweeps
//! one column per frame, so a viewer can see frames advance.

use ivg_core::{Result, RgbFrame};

/// Moving test pattern.
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            tick: 0,
        }
    }

    /// Column of the bar in the next frame.
    pub fn bar_column(&self) -> u32 {
        self.tick % self.width
    }

    /// Render the next frame and advance the bar.
    pub fn next_frame(&mut self) -> Result<RgbFrame> {
        let (w, h) = (self.width, self.height);
        let bar = self.bar_column();
        let span = (w + h).saturating_sub(2).max(1);

        let mut data = Vec::with_capacity(rgb_len(w, h));
        for y in 0..h {
            for x in 0..w {
                if x == bar {
                    data.extend_from_slice(&[255, 255, 255]);
                } else {
                    let level = ((x + y) * 200 / span) as u8;
                    data.extend_from_slice(&[level, level / 2, 200 - level]);
                }
            }
        }

        self.tick = self.tick.wrapping_add(1);
        RgbFrame::rgb(w, h, data)
    }
}

/// Bytes in a packed RGB buffer of `width × height`.
fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_has_requested_size() {
        let mut p = TestPattern::new(8, 4);
        let f = p.next_frame().unwrap();
        assert_eq!((f.width(), f.height()), (8, 4));
        assert_eq!(f.data().len(), 8 * 4 * 3);
    }

    #[test]
    fn bar_sweeps_and_wraps() {
        let mut p = TestPattern::new(3, 2);
        let cols: Vec<u32> = (0..5)
            .map(|_| {
                let c = p.bar_column();
                p.next_frame().unwrap();
                c
            })
            .collect();
        assert_eq!(cols, vec![0, 1, 2, 0, 1]);
    }

    #[test]
    fn bar_is_white() {
        let mut p = TestPattern::new(5, 5);
        p.next_frame().unwrap();
        let f = p.next_frame().unwrap();
        let idx = (2 * 5 + 1) * 3;
        assert_eq!(&f.data()[idx..idx + 3], &[255, 255, 255]);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn buffer_len_of_largest_frame_does_not_wrap() {
        assert_eq!(rgb_len(65_535, 65_535), 12_884_508_675);
    }

    #[test]
    fn single_pixel_pattern() {
        let mut p = TestPattern::new(0, 0);
        let f = p.next_frame().unwrap();
        assert_eq!(f.data(), &[255, 255, 255]);
    }
}
