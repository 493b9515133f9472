//! Packed RGB8 frame type.
//!
//! Frames are transient: a source produces one, the pipeline consumes it, and
//! it is discarded. When a camera is unavailable the loop substitutes
//! `Frame::placeholder()` (1x1x3, zero-filled) so downstream shape assumptions
//! hold without special-casing.

/// A packed RGB8 pixel buffer.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap an existing packed RGB buffer. The buffer is truncated or
    /// zero-padded to exactly `width * height * 3` bytes.
    pub fn from_rgb(mut data: Vec<u8>, width: u32, height: u32) -> Self {
        data.resize((width * height * 3) as usize, 0);
        Self {
            data,
            width,
            height,
        }
    }

    /// A zero-filled frame of the given size.
    pub fn black(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; (width * height * 3) as usize],
            width,
            height,
        }
    }

    /// The 1x1x3 substitute frame used when a camera is unavailable.
    pub fn placeholder() -> Self {
        Self::black(1, 1)
    }

    pub fn is_placeholder(&self) -> bool {
        self.width == 1 && self.height == 1
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 3) as usize
    }

    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let i = self.offset(x, y);
        (self.data[i], self.data[i + 1], self.data[i + 2])
    }

    #[inline]
    pub fn put_rgb(&mut self, x: u32, y: u32, rgb: (u8, u8, u8)) {
        let i = self.offset(x, y);
        self.data[i] = rgb.0;
        self.data[i + 1] = rgb.1;
        self.data[i + 2] = rgb.2;
    }

    /// Fill an axis-aligned rectangle, clipped to the frame bounds.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: (u8, u8, u8)) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for yy in y.min(self.height)..y_end {
            for xx in x.min(self.width)..x_end {
                self.put_rgb(xx, yy, rgb);
            }
        }
    }
}
