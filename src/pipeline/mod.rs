//! The fixed vision pipeline.
//!
//! Two operation families, both pure functions over a frame:
//!
//! - **Contour**: resize, box blur, HSV threshold, contour extraction and
//!   geometric filtering, convex hulls, then centers/boxes and derived
//!   direction/distance scalars.
//! - **Tracking**: hue-histogram back-projection plus mean-shift/cam-shift
//!   window relocation (see [`track`]).
//!
//! All thresholds and constants live in [`DetectParams`] so the one pipeline
//! serves every historical tuning of the client.

pub mod contour;
pub mod ops;
pub mod track;

use crate::error::VisionError;
use crate::frame::Frame;

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Axis-aligned rectangle, also used as the mutable tracking window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.w as f64 / 2.0,
            self.y as f64 + self.h as f64 / 2.0,
        )
    }

    /// A `w` x `h` window centered in a `width` x `height` frame.
    pub fn centered_in(width: u32, height: u32, w: u32, h: u32) -> Self {
        let w = w.min(width);
        let h = h.min(height);
        Self::new(
            ((width - w) / 2) as i32,
            ((height - h) / 2) as i32,
            w,
            h,
        )
    }
}

/// Inclusive HSV threshold bounds, OpenCV scale (H 0..179, S/V 0..255).
#[derive(Clone, Copy, Debug)]
pub struct HsvRange {
    pub hue: (u8, u8),
    pub sat: (u8, u8),
    pub val: (u8, u8),
}

impl Default for HsvRange {
    fn default() -> Self {
        Self {
            hue: (64, 88),
            sat: (89, 255),
            val: (0, 255),
        }
    }
}

impl HsvRange {
    #[inline]
    pub fn contains(&self, h: u8, s: u8, v: u8) -> bool {
        h >= self.hue.0
            && h <= self.hue.1
            && s >= self.sat.0
            && s <= self.sat.1
            && v >= self.val.0
            && v <= self.val.1
    }
}

/// Geometric bounds a contour must satisfy to survive filtering.
#[derive(Clone, Copy, Debug)]
pub struct ContourFilter {
    pub min_area: f64,
    pub min_perimeter: f64,
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub min_solidity: f64,
    pub max_solidity: f64,
    pub min_vertices: usize,
    pub max_vertices: usize,
    pub min_ratio: f64,
    pub max_ratio: f64,
}

impl Default for ContourFilter {
    fn default() -> Self {
        Self {
            min_area: 200.0,
            min_perimeter: 0.0,
            min_width: 10,
            max_width: 1000,
            min_height: 10,
            max_height: 1000,
            min_solidity: 0.0,
            max_solidity: 100.0,
            min_vertices: 0,
            max_vertices: 100_000,
            min_ratio: 0.0,
            max_ratio: 1000.0,
        }
    }
}

/// How surviving contour centers are reduced into the published "average".
///
/// The deployed client summed centers without dividing by the count. That
/// behavior is preserved as the default so downstream consumers tuned against
/// it keep working; `Mean` is the corrected reduction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reduction {
    #[default]
    Sum,
    Mean,
}

/// Every knob of the contour pipeline in one place.
#[derive(Clone, Debug)]
pub struct DetectParams {
    pub resize_width: u32,
    pub resize_height: u32,
    pub blur_radius: u32,
    pub hsv: HsvRange,
    pub filter: ContourFilter,
    pub reduction: Reduction,
    /// Empirical constant relating pixel offsets to angles and distance.
    /// Historical tunings used 3.5 and 14.
    pub distance_constant: f64,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            resize_width: 280,
            resize_height: 210,
            blur_radius: 5,
            hsv: HsvRange::default(),
            filter: ContourFilter::default(),
            reduction: Reduction::default(),
            distance_constant: 3.5,
        }
    }
}

/// Everything the contour family produces for one frame. Coordinates are in
/// the resized pipeline space (`resize_width` x `resize_height`).
#[derive(Clone, Debug, Default)]
pub struct ContourReport {
    /// Reduced center per the configured [`Reduction`].
    pub reduced_center: (f64, f64),
    /// One center per surviving contour, pipeline order.
    pub centers: Vec<(f64, f64)>,
    /// One bounding box per surviving contour, pipeline order.
    pub boxes: Vec<Rect>,
}

impl ContourReport {
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }
}

/// Derived scalars published to the table for driver assistance.
#[derive(Clone, Copy, Debug)]
pub struct TargetEstimate {
    /// Degrees off frame center; negative is left of center.
    pub direction_degrees: f64,
    /// Unitless range estimate, inversely proportional to measured width.
    pub distance: f64,
}

/// Run the full contour chain on one frame.
pub fn detect(frame: &Frame, params: &DetectParams) -> ContourReport {
    let resized = ops::resize(frame, params.resize_width, params.resize_height);
    let blurred = ops::box_blur(&resized, params.blur_radius);
    let mask = ops::hsv_threshold(&blurred, &params.hsv);
    let contours = contour::filter_contours(contour::find_contours(&mask), &params.filter);

    let hulls: Vec<contour::Contour> = contours.iter().map(|c| c.convex_hull()).collect();
    let centers: Vec<(f64, f64)> = hulls.iter().map(|h| h.centroid()).collect();
    let boxes: Vec<Rect> = hulls.iter().map(|h| h.bounding_rect()).collect();

    let mut sum = (0.0, 0.0);
    for (cx, cy) in &centers {
        sum.0 += cx;
        sum.1 += cy;
    }
    let reduced_center = match params.reduction {
        Reduction::Sum => sum,
        Reduction::Mean => {
            if centers.is_empty() {
                (0.0, 0.0)
            } else {
                (sum.0 / centers.len() as f64, sum.1 / centers.len() as f64)
            }
        }
    };

    ContourReport {
        reduced_center,
        centers,
        boxes,
    }
}

/// Derive direction and distance from the first one or two bounding boxes.
///
/// With two boxes (a target framed by a pair of vision strips) the measured
/// center is their midpoint and the measured width the gap between them; with
/// one box its own center and width are used. An empty report, or a measured
/// width of zero, is `NoTargetDetected` and must skip the publish.
pub fn estimate_target(
    report: &ContourReport,
    params: &DetectParams,
) -> Result<TargetEstimate, VisionError> {
    let (center_x, measured_width) = match report.boxes.len() {
        0 => return Err(VisionError::NoTargetDetected),
        1 => {
            let b = report.boxes[0];
            (b.center().0, b.w as f64)
        }
        _ => {
            let a = report.boxes[0].center().0;
            let b = report.boxes[1].center().0;
            ((a + b) / 2.0, (a - b).abs())
        }
    };
    if measured_width <= 0.0 {
        return Err(VisionError::NoTargetDetected);
    }

    let offset_px = center_x - params.resize_width as f64 / 2.0;
    let direction_degrees = (offset_px * params.distance_constant)
        .atan2(measured_width)
        .to_degrees();
    let distance = params.distance_constant * params.resize_width as f64 / measured_width;

    Ok(TargetEstimate {
        direction_degrees,
        distance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: (u8, u8, u8) = (0, 255, 128);

    /// 640x480 scene with a centered target block, dark gray backdrop.
    fn centered_target_frame(block_w: u32, block_h: u32) -> Frame {
        let mut frame = Frame::black(640, 480);
        frame.fill_rect(0, 0, 640, 480, (40, 40, 40));
        frame.fill_rect(
            (640 - block_w) / 2,
            (480 - block_h) / 2,
            block_w,
            block_h,
            TARGET,
        );
        frame
    }

    #[test]
    fn centered_block_detects_as_single_centered_contour() {
        let frame = centered_target_frame(120, 100);
        let params = DetectParams::default();
        let report = detect(&frame, &params);
        assert_eq!(report.boxes.len(), 1, "boxes: {:?}", report.boxes);
        let (cx, cy) = report.centers[0];
        assert!((cx - 140.0).abs() < 3.0, "cx = {}", cx);
        assert!((cy - 105.0).abs() < 3.0, "cy = {}", cy);
    }

    #[test]
    fn centered_target_estimates_zero_direction_and_positive_distance() {
        let frame = centered_target_frame(120, 100);
        let params = DetectParams::default();
        let report = detect(&frame, &params);
        let est = estimate_target(&report, &params).expect("target");
        assert!(est.direction_degrees.abs() < 3.0, "dir = {}", est.direction_degrees);
        assert!(est.distance.is_finite() && est.distance > 0.0);
    }

    #[test]
    fn off_center_target_reports_signed_direction() {
        let mut frame = Frame::black(640, 480);
        frame.fill_rect(0, 0, 640, 480, (40, 40, 40));
        // Block on the right half.
        frame.fill_rect(420, 190, 120, 100, TARGET);
        let params = DetectParams::default();
        let report = detect(&frame, &params);
        let est = estimate_target(&report, &params).expect("target");
        assert!(est.direction_degrees > 10.0, "dir = {}", est.direction_degrees);
    }

    #[test]
    fn empty_scene_is_no_target_not_a_panic() {
        let mut frame = Frame::black(640, 480);
        frame.fill_rect(0, 0, 640, 480, (40, 40, 40));
        let params = DetectParams::default();
        let report = detect(&frame, &params);
        assert!(report.is_empty());
        assert!(matches!(
            estimate_target(&report, &params),
            Err(VisionError::NoTargetDetected)
        ));
    }

    #[test]
    fn placeholder_frame_is_no_target() {
        let params = DetectParams::default();
        let report = detect(&Frame::placeholder(), &params);
        assert!(report.is_empty());
    }

    #[test]
    fn two_boxes_measure_the_gap_between_strip_centers() {
        let report = ContourReport {
            reduced_center: (0.0, 0.0),
            centers: vec![(100.0, 105.0), (180.0, 105.0)],
            boxes: vec![Rect::new(90, 85, 20, 40), Rect::new(170, 85, 20, 40)],
        };
        let params = DetectParams::default();
        let est = estimate_target(&report, &params).expect("target");
        // Midpoint of strip centers is exactly frame center (140).
        assert!(est.direction_degrees.abs() < 0.01);
        assert!((est.distance - 3.5 * 280.0 / 80.0).abs() < 0.01);
    }

    #[test]
    fn sum_reduction_preserves_historical_behavior() {
        let frame = centered_target_frame(120, 100);
        let params = DetectParams::default();
        let report = detect(&frame, &params);
        // A single contour: sum equals the lone center.
        assert_eq!(report.reduced_center, report.centers[0]);

        let mean_params = DetectParams {
            reduction: Reduction::Mean,
            ..DetectParams::default()
        };
        let mean_report = detect(&frame, &mean_params);
        assert_eq!(mean_report.reduced_center, mean_report.centers[0]);
    }
}
