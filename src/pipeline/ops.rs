//! Fixed raster primitives the pipeline is built from.
//!
//! Everything operates on packed RGB8 `Frame`s or the binary `Mask` produced
//! by thresholding. Hue follows the OpenCV convention (0..179 half-degrees)
//! so threshold bounds transfer unchanged from tuning done against dashboards.

use crate::frame::Frame;
use crate::pipeline::HsvRange;

/// Binary image: 0 = background, 255 = foreground.
#[derive(Clone, Debug)]
pub struct Mask {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0; (width * height) as usize],
            width,
            height,
        }
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[(y * self.width + x) as usize] != 0
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, on: bool) {
        self.data[(y * self.width + x) as usize] = if on { 255 } else { 0 };
    }

    pub fn count_foreground(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Bilinear resize to an exact size.
pub fn resize(src: &Frame, width: u32, height: u32) -> Frame {
    if src.width == width && src.height == height {
        return src.clone();
    }
    let mut out = Frame::black(width, height);
    let sx = src.width as f32 / width as f32;
    let sy = src.height as f32 / height as f32;
    for y in 0..height {
        let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = (fy as u32).min(src.height - 1);
        let y1 = (y0 + 1).min(src.height - 1);
        let wy = fy - y0 as f32;
        for x in 0..width {
            let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = (fx as u32).min(src.width - 1);
            let x1 = (x0 + 1).min(src.width - 1);
            let wx = fx - x0 as f32;

            let mut rgb = [0u8; 3];
            let p00 = src.rgb(x0, y0);
            let p10 = src.rgb(x1, y0);
            let p01 = src.rgb(x0, y1);
            let p11 = src.rgb(x1, y1);
            for (c, slot) in rgb.iter_mut().enumerate() {
                let ch = |p: (u8, u8, u8)| match c {
                    0 => p.0 as f32,
                    1 => p.1 as f32,
                    _ => p.2 as f32,
                };
                let top = ch(p00) * (1.0 - wx) + ch(p10) * wx;
                let bottom = ch(p01) * (1.0 - wx) + ch(p11) * wx;
                *slot = (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8;
            }
            out.put_rgb(x, y, (rgb[0], rgb[1], rgb[2]));
        }
    }
    out
}

/// Box blur with kernel size `2 * radius + 1`, borders clamped.
///
/// Separable two-pass implementation with a running sum per channel.
pub fn box_blur(src: &Frame, radius: u32) -> Frame {
    if radius == 0 || src.is_placeholder() {
        return src.clone();
    }
    let r = radius as i64;
    let k = 2 * r + 1;
    let w = src.width as i64;
    let h = src.height as i64;

    // Horizontal pass into a u16 intermediate to avoid rounding twice.
    let mut mid = vec![0u16; (w * h * 3) as usize];
    for y in 0..h {
        for c in 0..3i64 {
            let px = |x: i64| {
                let x = x.clamp(0, w - 1);
                let (pr, pg, pb) = src.rgb(x as u32, y as u32);
                match c {
                    0 => pr as i64,
                    1 => pg as i64,
                    _ => pb as i64,
                }
            };
            let mut sum: i64 = (-r..=r).map(px).sum();
            for x in 0..w {
                mid[((y * w + x) * 3 + c) as usize] = (sum / k) as u16;
                sum += px(x + r + 1) - px(x - r);
            }
        }
    }

    let mut out = Frame::black(src.width, src.height);
    for x in 0..w {
        for c in 0..3i64 {
            let px = |y: i64| {
                let y = y.clamp(0, h - 1);
                mid[((y * w + x) * 3 + c) as usize] as i64
            };
            let mut sum: i64 = (-r..=r).map(px).sum();
            for y in 0..h {
                let v = (sum / k).clamp(0, 255) as u8;
                match c {
                    0 => {
                        let (_, g, b) = out.rgb(x as u32, y as u32);
                        out.put_rgb(x as u32, y as u32, (v, g, b));
                    }
                    1 => {
                        let (rr, _, b) = out.rgb(x as u32, y as u32);
                        out.put_rgb(x as u32, y as u32, (rr, v, b));
                    }
                    _ => {
                        let (rr, g, _) = out.rgb(x as u32, y as u32);
                        out.put_rgb(x as u32, y as u32, (rr, g, v));
                    }
                }
                sum += px(y + r + 1) - px(y - r);
            }
        }
    }
    out
}

/// RGB to HSV in the OpenCV convention: H in 0..179, S and V in 0..255.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let rf = r as f32;
    let gf = g as f32;
    let bf = b as f32;
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let v = max;
    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };
    let h_deg = if delta == 0.0 {
        0.0
    } else if max == rf {
        let mut h = 60.0 * (gf - bf) / delta;
        if h < 0.0 {
            h += 360.0;
        }
        h
    } else if max == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };

    (
        (h_deg / 2.0).round().clamp(0.0, 179.0) as u8,
        s.round().clamp(0.0, 255.0) as u8,
        v.round().clamp(0.0, 255.0) as u8,
    )
}

/// Segment a frame into a binary mask by HSV range.
pub fn hsv_threshold(src: &Frame, range: &HsvRange) -> Mask {
    let mut mask = Mask::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let (r, g, b) = src.rgb(x, y);
            let (h, s, v) = rgb_to_hsv(r, g, b);
            mask.set(x, y, range.contains(h, s, v));
        }
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hsv_of_primaries_matches_opencv_convention() {
        assert_eq!(rgb_to_hsv(255, 0, 0), (0, 255, 255));
        assert_eq!(rgb_to_hsv(0, 255, 0), (60, 255, 255));
        assert_eq!(rgb_to_hsv(0, 0, 255), (120, 255, 255));
        // Gray has no saturation and hue 0.
        assert_eq!(rgb_to_hsv(40, 40, 40), (0, 0, 40));
    }

    #[test]
    fn spring_green_falls_in_default_threshold_band() {
        // (0, 255, 128) sits at H=75, inside the tuned [64, 88] band.
        let (h, s, v) = rgb_to_hsv(0, 255, 128);
        let range = HsvRange::default();
        assert!(range.contains(h, s, v), "h={} s={} v={}", h, s, v);
    }

    #[test]
    fn threshold_separates_target_from_gray_background() {
        let mut frame = Frame::black(8, 8);
        frame.fill_rect(0, 0, 8, 8, (40, 40, 40));
        frame.fill_rect(2, 2, 3, 3, (0, 255, 128));
        let mask = hsv_threshold(&frame, &HsvRange::default());
        assert_eq!(mask.count_foreground(), 9);
        assert!(mask.get(3, 3));
        assert!(!mask.get(0, 0));
    }

    #[test]
    fn box_blur_preserves_uniform_frames() {
        let mut frame = Frame::black(16, 16);
        frame.fill_rect(0, 0, 16, 16, (100, 150, 200));
        let blurred = box_blur(&frame, 5);
        assert_eq!(blurred.rgb(8, 8), (100, 150, 200));
        assert_eq!(blurred.rgb(0, 0), (100, 150, 200));
    }

    #[test]
    fn resize_hits_exact_dimensions() {
        let frame = Frame::black(640, 480);
        let small = resize(&frame, 280, 210);
        assert_eq!((small.width, small.height), (280, 210));
    }

    #[test]
    fn resize_passes_placeholder_through_without_panic() {
        let small = resize(&Frame::placeholder(), 280, 210);
        assert_eq!((small.width, small.height), (280, 210));
    }
}
