//! Hue-histogram tracking: back-projection plus mean-shift / cam-shift.
//!
//! A `HueHistogram` is built once from an initial region of interest and held
//! read-only for the rest of the run. Each iteration back-projects the current
//! frame against it and relocates the window toward the density peak. The
//! cam-shift variant additionally adapts the window size from the density
//! moments and reports four oriented corner points.

use crate::frame::Frame;
use crate::pipeline::ops::rgb_to_hsv;
use crate::pipeline::{HsvRange, Point, Rect};

/// Mean-shift termination: at most 10 relocations, or a shift below 1 pixel.
pub const TERM_MAX_ITERATIONS: u32 = 10;
pub const TERM_EPSILON: f64 = 1.0;

/// Fixed 180-bin histogram over the hue channel, normalized to 0..255.
#[derive(Clone, Debug)]
pub struct HueHistogram {
    bins: [f32; 180],
}

impl HueHistogram {
    /// Accumulate hue counts over `roi`, masked by the HSV range, then
    /// normalize the peak to 255.
    pub fn from_roi(frame: &Frame, roi: Rect, range: &HsvRange) -> Self {
        let mut bins = [0f32; 180];
        let x0 = roi.x.max(0) as u32;
        let y0 = roi.y.max(0) as u32;
        let x1 = (roi.x + roi.w as i32).clamp(0, frame.width as i32) as u32;
        let y1 = (roi.y + roi.h as i32).clamp(0, frame.height as i32) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                let (r, g, b) = frame.rgb(x, y);
                let (h, s, v) = rgb_to_hsv(r, g, b);
                if range.contains(h, s, v) {
                    bins[h.min(179) as usize] += 1.0;
                }
            }
        }
        let peak = bins.iter().cloned().fold(0f32, f32::max);
        if peak > 0.0 {
            for bin in bins.iter_mut() {
                *bin *= 255.0 / peak;
            }
        }
        Self { bins }
    }

    #[inline]
    pub fn weight(&self, hue: u8) -> f32 {
        self.bins[hue.min(179) as usize]
    }
}

/// Per-pixel density from back-projecting a frame against a histogram.
pub struct Density {
    data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl Density {
    #[inline]
    fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }
}

/// Back-project every pixel's hue through the histogram.
pub fn back_project(frame: &Frame, hist: &HueHistogram) -> Density {
    let mut data = Vec::with_capacity((frame.width * frame.height) as usize);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let (r, g, b) = frame.rgb(x, y);
            let (h, _, _) = rgb_to_hsv(r, g, b);
            data.push(hist.weight(h));
        }
    }
    Density {
        data,
        width: frame.width,
        height: frame.height,
    }
}

/// Density mass and centroid within a window. Mass of zero means the window
/// saw no back-projected support at all.
fn window_moments(density: &Density, window: Rect) -> (f64, f64, f64) {
    let x0 = window.x.max(0) as u32;
    let y0 = window.y.max(0) as u32;
    let x1 = (window.x + window.w as i32).clamp(0, density.width as i32) as u32;
    let y1 = (window.y + window.h as i32).clamp(0, density.height as i32) as u32;
    let mut m00 = 0.0;
    let mut m10 = 0.0;
    let mut m01 = 0.0;
    for y in y0..y1 {
        for x in x0..x1 {
            let d = density.get(x, y) as f64;
            m00 += d;
            m10 += d * x as f64;
            m01 += d * y as f64;
        }
    }
    (m00, m10, m01)
}

fn clamp_window(window: Rect, width: u32, height: u32) -> Rect {
    let w = window.w.min(width);
    let h = window.h.min(height);
    let x = window.x.clamp(0, (width - w) as i32);
    let y = window.y.clamp(0, (height - h) as i32);
    Rect::new(x, y, w, h)
}

/// Relocate `window` toward the local density maximum.
///
/// The window size is preserved; only its position moves. Returns the number
/// of relocations performed together with the converged window, so callers
/// can observe convergence on a static scene.
pub fn mean_shift(density: &Density, window: Rect) -> (u32, Rect) {
    let mut window = clamp_window(window, density.width, density.height);
    for iteration in 0..TERM_MAX_ITERATIONS {
        let (m00, m10, m01) = window_moments(density, window);
        if m00 <= f64::EPSILON {
            return (iteration, window);
        }
        let cx = m10 / m00;
        let cy = m01 / m00;
        let new_x = (cx - window.w as f64 / 2.0).round() as i32;
        let new_y = (cy - window.h as f64 / 2.0).round() as i32;
        let moved = clamp_window(Rect::new(new_x, new_y, window.w, window.h), density.width, density.height);
        let shift = (((moved.x - window.x).pow(2) + (moved.y - window.y).pow(2)) as f64).sqrt();
        window = moved;
        if shift < TERM_EPSILON {
            return (iteration + 1, window);
        }
    }
    (TERM_MAX_ITERATIONS, window)
}

/// Result of a cam-shift step: the relocated, resized window plus the four
/// oriented corner points of the underlying density ellipse.
#[derive(Clone, Debug)]
pub struct CamShiftResult {
    pub window: Rect,
    pub points: [Point; 4],
}

/// Mean-shift, then re-derive window size and orientation from the second
/// moments of the density inside the converged window.
pub fn cam_shift(density: &Density, window: Rect) -> CamShiftResult {
    let (_, window) = mean_shift(density, window);
    let (m00, m10, m01) = window_moments(density, window);
    if m00 <= f64::EPSILON {
        let rect = window;
        let points = [
            Point { x: rect.x, y: rect.y },
            Point { x: rect.x + rect.w as i32, y: rect.y },
            Point { x: rect.x + rect.w as i32, y: rect.y + rect.h as i32 },
            Point { x: rect.x, y: rect.y + rect.h as i32 },
        ];
        return CamShiftResult { window, points };
    }
    let cx = m10 / m00;
    let cy = m01 / m00;

    // Central second moments within the window.
    let x0 = window.x.max(0) as u32;
    let y0 = window.y.max(0) as u32;
    let x1 = (window.x + window.w as i32).clamp(0, density.width as i32) as u32;
    let y1 = (window.y + window.h as i32).clamp(0, density.height as i32) as u32;
    let mut mu20 = 0.0;
    let mut mu02 = 0.0;
    let mut mu11 = 0.0;
    for y in y0..y1 {
        for x in x0..x1 {
            let d = density.get(x, y) as f64;
            let dx = x as f64 - cx;
            let dy = y as f64 - cy;
            mu20 += d * dx * dx;
            mu02 += d * dy * dy;
            mu11 += d * dx * dy;
        }
    }
    mu20 /= m00;
    mu02 /= m00;
    mu11 /= m00;

    let theta = 0.5 * (2.0 * mu11).atan2(mu20 - mu02);
    let common = ((mu20 - mu02).powi(2) + 4.0 * mu11 * mu11).sqrt();
    let l1 = ((mu20 + mu02 + common) / 2.0).max(0.0);
    let l2 = ((mu20 + mu02 - common) / 2.0).max(0.0);
    // Two standard deviations along each principal axis.
    let half_major = 2.0 * l1.sqrt();
    let half_minor = 2.0 * l2.sqrt();

    let (sin, cos) = theta.sin_cos();
    let corner = |sa: f64, sb: f64| Point {
        x: (cx + sa * half_major * cos - sb * half_minor * sin).round() as i32,
        y: (cy + sa * half_major * sin + sb * half_minor * cos).round() as i32,
    };
    let points = [
        corner(-1.0, -1.0),
        corner(1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, 1.0),
    ];

    let min_x = points.iter().map(|p| p.x).min().unwrap_or(window.x);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(window.x);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(window.y);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(window.y);
    let resized = Rect::new(
        min_x,
        min_y,
        ((max_x - min_x).max(1) as u32).min(density.width),
        ((max_y - min_y).max(1) as u32).min(density.height),
    );
    CamShiftResult {
        window: clamp_window(resized, density.width, density.height),
        points,
    }
}

/// Orientation angle from two successive polygon edges.
///
/// Each edge angle is tested against the (45, 135) band; the second edge wins
/// when both qualify, and 90 is reported when neither does. The coordinate
/// roles mirror the historical derivation exactly, including the
/// `|atan - 180|` folding.
pub fn orientation_angle(points: &[Point; 4]) -> f64 {
    let edge = |a: Point, b: Point| -> f64 {
        let rise = (b.x - a.x) as f64;
        let run = (b.y - a.y) as f64;
        let raw = if run == 0.0 {
            90.0
        } else {
            (rise / run).atan().to_degrees()
        };
        (raw - 180.0).abs()
    };
    let mut angle = 90.0;
    let first = edge(points[0], points[1]);
    let second = edge(points[1], points[2]);
    if first > 45.0 && first < 135.0 {
        angle = first;
    }
    if second > 45.0 && second < 135.0 {
        angle = second;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: (u8, u8, u8) = (0, 255, 128);

    fn scene_with_block(x: u32, y: u32) -> Frame {
        let mut frame = Frame::black(160, 120);
        frame.fill_rect(0, 0, 160, 120, (40, 40, 40));
        frame.fill_rect(x, y, 24, 24, TARGET);
        frame
    }

    #[test]
    fn histogram_peaks_at_target_hue() {
        let frame = scene_with_block(60, 40);
        let hist = HueHistogram::from_roi(&frame, Rect::new(60, 40, 24, 24), &HsvRange::default());
        let (h, _, _) = rgb_to_hsv(TARGET.0, TARGET.1, TARGET.2);
        assert_eq!(hist.weight(h), 255.0);
        assert_eq!(hist.weight(0), 0.0);
    }

    #[test]
    fn mean_shift_locks_onto_displaced_target() {
        let reference = scene_with_block(60, 40);
        let hist =
            HueHistogram::from_roi(&reference, Rect::new(60, 40, 24, 24), &HsvRange::default());

        let moved = scene_with_block(100, 70);
        let density = back_project(&moved, &hist);
        // Start overlapping the displaced block so the shift has support.
        let (_, window) = mean_shift(&density, Rect::new(90, 60, 24, 24));
        // Window center should land on the block center (112, 82).
        let cx = window.x + window.w as i32 / 2;
        let cy = window.y + window.h as i32 / 2;
        assert!((cx - 112).abs() <= 2, "cx = {}", cx);
        assert!((cy - 82).abs() <= 2, "cy = {}", cy);
    }

    #[test]
    fn mean_shift_is_stable_after_convergence() {
        let frame = scene_with_block(80, 50);
        let hist = HueHistogram::from_roi(&frame, Rect::new(80, 50, 24, 24), &HsvRange::default());
        let density = back_project(&frame, &hist);

        let (_, converged) = mean_shift(&density, Rect::new(60, 30, 24, 24));
        let (iterations, again) = mean_shift(&density, converged);
        assert!(iterations <= 1, "iterations = {}", iterations);
        assert_eq!((again.x, again.y), (converged.x, converged.y));
    }

    #[test]
    fn mean_shift_with_no_support_leaves_window_in_place() {
        let frame = scene_with_block(80, 50);
        let hist = HueHistogram::from_roi(&frame, Rect::new(80, 50, 24, 24), &HsvRange::default());
        // Back-project a frame with no target at all.
        let mut empty = Frame::black(160, 120);
        empty.fill_rect(0, 0, 160, 120, (40, 40, 40));
        let density = back_project(&empty, &hist);
        let start = Rect::new(10, 10, 24, 24);
        let (iterations, window) = mean_shift(&density, start);
        assert_eq!(iterations, 0);
        assert_eq!((window.x, window.y), (10, 10));
    }

    #[test]
    fn cam_shift_window_tracks_target_extent() {
        let frame = scene_with_block(70, 45);
        let hist = HueHistogram::from_roi(&frame, Rect::new(70, 45, 24, 24), &HsvRange::default());
        let density = back_project(&frame, &hist);
        let result = cam_shift(&density, Rect::new(50, 30, 30, 30));
        let cx = result.window.x + result.window.w as i32 / 2;
        let cy = result.window.y + result.window.h as i32 / 2;
        assert!((cx - 82).abs() <= 3, "cx = {}", cx);
        assert!((cy - 57).abs() <= 3, "cy = {}", cy);
    }

    #[test]
    fn orientation_defaults_to_ninety_for_axis_aligned_box() {
        // Neither edge of an axis-aligned box moves the result off 90.
        let points = [
            Point { x: 0, y: 0 },
            Point { x: 10, y: 0 },
            Point { x: 10, y: 10 },
            Point { x: 0, y: 10 },
        ];
        assert_eq!(orientation_angle(&points), 90.0);
    }

    #[test]
    fn orientation_picks_qualifying_tilted_edge() {
        // Edge (0,0)->(8,6): atan(8/6) = 53.1 deg, folds to 126.9, in band.
        let points = [
            Point { x: 0, y: 0 },
            Point { x: 8, y: 6 },
            Point { x: 2, y: 14 },
            Point { x: -6, y: 8 },
        ];
        let angle = orientation_angle(&points);
        assert!(angle > 45.0 && angle < 135.0, "angle = {}", angle);
        assert!((angle - 126.87).abs() < 0.1, "angle = {}", angle);
    }
}
