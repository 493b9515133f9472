//! Contour extraction and geometric filtering.
//!
//! Contours are closed boundaries of 8-connected foreground regions in a
//! binary mask, traced with Moore neighbor following. Survivors of the
//! geometric filters are replaced by their convex hulls before centers and
//! bounding boxes are computed, matching the fixed dashboard-tuned chain.

use crate::pipeline::{ContourFilter, Point, Rect};
use crate::pipeline::ops::Mask;

/// A traced boundary polygon.
#[derive(Clone, Debug)]
pub struct Contour {
    pub points: Vec<Point>,
}

impl Contour {
    /// Signed shoelace area of the closed polygon, returned as an absolute value.
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Length of the closed boundary.
    pub fn perimeter(&self) -> f64 {
        let n = self.points.len();
        if n < 2 {
            return 0.0;
        }
        (0..n)
            .map(|i| {
                let a = self.points[i];
                let b = self.points[(i + 1) % n];
                let dx = (b.x - a.x) as f64;
                let dy = (b.y - a.y) as f64;
                (dx * dx + dy * dy).sqrt()
            })
            .sum()
    }

    pub fn bounding_rect(&self) -> Rect {
        bounding_rect(&self.points)
    }

    /// Convex hull of the boundary as a new contour.
    pub fn convex_hull(&self) -> Contour {
        Contour {
            points: convex_hull(&self.points),
        }
    }

    /// Centroid from polygon moments, falling back to the vertex mean for
    /// degenerate (zero-area) boundaries.
    pub fn centroid(&self) -> (f64, f64) {
        let n = self.points.len();
        if n == 0 {
            return (0.0, 0.0);
        }
        let mut m00 = 0.0;
        let mut m10 = 0.0;
        let mut m01 = 0.0;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            let cross = (a.x as f64) * (b.y as f64) - (b.x as f64) * (a.y as f64);
            m00 += cross;
            m10 += (a.x + b.x) as f64 * cross;
            m01 += (a.y + b.y) as f64 * cross;
        }
        m00 /= 2.0;
        if m00.abs() < f64::EPSILON {
            let sx: f64 = self.points.iter().map(|p| p.x as f64).sum();
            let sy: f64 = self.points.iter().map(|p| p.y as f64).sum();
            return (sx / n as f64, sy / n as f64);
        }
        (m10 / (6.0 * m00), m01 / (6.0 * m00))
    }
}

fn polygon_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut twice: f64 = 0.0;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        twice += (a.x as f64) * (b.y as f64) - (b.x as f64) * (a.y as f64);
    }
    (twice / 2.0).abs()
}

fn bounding_rect(points: &[Point]) -> Rect {
    if points.is_empty() {
        return Rect::new(0, 0, 0, 0);
    }
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0);
    Rect::new(
        min_x,
        min_y,
        (max_x - min_x + 1) as u32,
        (max_y - min_y + 1) as u32,
    )
}

/// Andrew monotone chain. Returns hull vertices in counter-clockwise order.
fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.to_vec();
    pts.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    pts.dedup();
    let n = pts.len();
    if n < 3 {
        return pts;
    }
    let cross = |o: Point, a: Point, b: Point| -> i64 {
        (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
    };
    let mut hull: Vec<Point> = Vec::with_capacity(2 * n);
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev() {
        while hull.len() >= lower_len && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0 {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

// Moore neighborhood, clockwise starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Find the boundary of every 8-connected foreground component.
pub fn find_contours(mask: &Mask) -> Vec<Contour> {
    let w = mask.width as i32;
    let h = mask.height as i32;
    let mut labels = vec![0u32; (w * h) as usize];
    let mut contours = Vec::new();
    let mut next_label = 0u32;

    let on = |x: i32, y: i32| x >= 0 && x < w && y >= 0 && y < h && mask.get(x as u32, y as u32);

    for y in 0..h {
        for x in 0..w {
            if !on(x, y) || labels[(y * w + x) as usize] != 0 {
                continue;
            }
            next_label += 1;
            let label = next_label;

            // Flood-fill the component so later scan rows skip it.
            let mut stack = vec![(x, y)];
            labels[(y * w + x) as usize] = label;
            while let Some((cx, cy)) = stack.pop() {
                for (dx, dy) in DIRS {
                    let nx = cx + dx;
                    let ny = cy + dy;
                    if on(nx, ny) && labels[(ny * w + nx) as usize] == 0 {
                        labels[(ny * w + nx) as usize] = label;
                        stack.push((nx, ny));
                    }
                }
            }

            contours.push(trace_boundary(mask, x, y));
        }
    }
    contours
}

/// Moore neighbor tracing from a raster-order start pixel. The start pixel is
/// guaranteed to have no foreground neighbor above or to its left.
fn trace_boundary(mask: &Mask, sx: i32, sy: i32) -> Contour {
    let w = mask.width as i32;
    let h = mask.height as i32;
    let on = |x: i32, y: i32| x >= 0 && x < w && y >= 0 && y < h && mask.get(x as u32, y as u32);

    let start = Point { x: sx, y: sy };
    let mut points = vec![start];

    // Entered scanning from the west.
    let mut current = start;
    let mut backtrack_dir = 4usize; // index of (-1, 0) in DIRS
    let limit = (w * h * 4) as usize;

    loop {
        // Scan clockwise starting just after the backtrack direction.
        let mut found = None;
        for step in 1..=8 {
            let dir = (backtrack_dir + step) % 8;
            let (dx, dy) = DIRS[dir];
            if on(current.x + dx, current.y + dy) {
                found = Some(dir);
                break;
            }
        }
        let Some(dir) = found else {
            break; // isolated pixel
        };
        let (dx, dy) = DIRS[dir];
        current = Point {
            x: current.x + dx,
            y: current.y + dy,
        };
        // New backtrack points from the new pixel toward the previous one;
        // the next scan resumes one step clockwise of it.
        backtrack_dir = (dir + 4) % 8;

        // First re-entry of the start pixel ends the trace, not the full
        // Jacob stopping criterion. A component pinched to a single pixel
        // at its raster start traces only the first lobe.
        if current == start || points.len() >= limit {
            break;
        }
        points.push(current);
    }

    Contour { points }
}

/// Drop contours outside the geometric bounds. Mirrors the fixed filter chain:
/// bounding-box width/height, polygon area, perimeter, hull solidity, vertex
/// count, and aspect ratio, in that order.
pub fn filter_contours(contours: Vec<Contour>, filter: &ContourFilter) -> Vec<Contour> {
    contours
        .into_iter()
        .filter(|c| {
            let rect = c.bounding_rect();
            if rect.w < filter.min_width || rect.w > filter.max_width {
                return false;
            }
            if rect.h < filter.min_height || rect.h > filter.max_height {
                return false;
            }
            let area = c.area();
            if area < filter.min_area {
                return false;
            }
            if c.perimeter() < filter.min_perimeter {
                return false;
            }
            let hull_area = c.convex_hull().area();
            if hull_area > 0.0 {
                let solidity = 100.0 * area / hull_area;
                if solidity < filter.min_solidity || solidity > filter.max_solidity {
                    return false;
                }
            }
            let vertices = c.points.len();
            if vertices < filter.min_vertices || vertices > filter.max_vertices {
                return false;
            }
            if rect.h > 0 {
                let ratio = rect.w as f64 / rect.h as f64;
                if ratio < filter.min_ratio || ratio > filter.max_ratio {
                    return false;
                }
            }
            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ContourFilter;

    fn rect_mask(w: u32, h: u32, x: u32, y: u32, rw: u32, rh: u32) -> Mask {
        let mut mask = Mask::new(w, h);
        for yy in y..(y + rh).min(h) {
            for xx in x..(x + rw).min(w) {
                mask.set(xx, yy, true);
            }
        }
        mask
    }

    #[test]
    fn filled_rect_yields_one_contour_with_matching_bbox() {
        let mask = rect_mask(100, 100, 20, 30, 40, 25);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        let rect = contours[0].bounding_rect();
        assert_eq!((rect.x, rect.y, rect.w, rect.h), (20, 30, 40, 25));
    }

    #[test]
    fn rect_contour_area_matches_shoelace_of_boundary() {
        let mask = rect_mask(100, 100, 10, 10, 30, 20);
        let contours = find_contours(&mask);
        // Boundary polygon spans 29x19 pixel centers.
        let area = contours[0].area();
        assert!((area - 29.0 * 19.0).abs() < 1.0, "area = {}", area);
    }

    #[test]
    fn rect_is_fully_solid() {
        let mask = rect_mask(100, 100, 10, 10, 30, 20);
        let contours = find_contours(&mask);
        let c = &contours[0];
        let solidity = 100.0 * c.area() / c.convex_hull().area();
        assert!(solidity > 99.0 && solidity <= 100.0, "solidity = {}", solidity);
    }

    #[test]
    fn centroid_of_rect_is_its_center() {
        let mask = rect_mask(100, 100, 10, 10, 21, 21);
        let contours = find_contours(&mask);
        let (cx, cy) = contours[0].centroid();
        assert!((cx - 20.0).abs() < 0.5, "cx = {}", cx);
        assert!((cy - 20.0).abs() < 0.5, "cy = {}", cy);
    }

    #[test]
    fn separate_blobs_produce_separate_contours() {
        let mut mask = rect_mask(100, 100, 5, 5, 20, 20);
        for y in 60..80 {
            for x in 60..80 {
                mask.set(x, y, true);
            }
        }
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 2);
    }

    #[test]
    fn filter_drops_blobs_below_minimum_area_and_width() {
        let mut mask = rect_mask(200, 200, 10, 10, 40, 30);
        // A 4x4 speck: fails min_width 10 and min_area 200.
        for y in 100..104 {
            for x in 100..104 {
                mask.set(x, y, true);
            }
        }
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 2);
        let kept = filter_contours(contours, &ContourFilter::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].bounding_rect().w, 40);
    }

    #[test]
    fn surviving_boxes_always_respect_filter_bounds() {
        let mut mask = Mask::new(300, 300);
        // A spread of blobs of assorted sizes.
        let specs = [(5u32, 5u32, 3u32, 3u32), (20, 20, 50, 40), (100, 100, 8, 60), (150, 5, 90, 12)];
        for (x, y, w, h) in specs {
            for yy in y..y + h {
                for xx in x..x + w {
                    mask.set(xx, yy, true);
                }
            }
        }
        let filter = ContourFilter::default();
        let kept = filter_contours(find_contours(&mask), &filter);
        for c in &kept {
            let rect = c.bounding_rect();
            assert!(rect.w >= filter.min_width && rect.w <= filter.max_width);
            assert!(rect.h >= filter.min_height && rect.h <= filter.max_height);
            assert!(c.area() >= filter.min_area);
        }
    }

    #[test]
    fn diagonally_pinched_lobes_trace_as_one_boundary() {
        // Two squares touching only at a corner are one 8-connected
        // component; the trace must cross the pinch and cover both.
        let mut mask = Mask::new(8, 8);
        for (x, y) in [(1, 1), (2, 1), (1, 2), (2, 2), (3, 3), (4, 3), (3, 4), (4, 4)] {
            mask.set(x, y, true);
        }
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        let rect = contours[0].bounding_rect();
        assert_eq!((rect.x, rect.y, rect.w, rect.h), (1, 1, 4, 4));
    }

    #[test]
    fn isolated_pixel_does_not_hang_the_tracer() {
        let mut mask = Mask::new(10, 10);
        mask.set(5, 5, true);
        let contours = find_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points.len(), 1);
        assert_eq!(contours[0].area(), 0.0);
    }

    #[test]
    fn empty_mask_yields_no_contours() {
        let contours = find_contours(&Mask::new(50, 50));
        assert!(contours.is_empty());
    }
}
