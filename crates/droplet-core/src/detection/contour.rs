//! Outer-border contours of binary masks and the geometry computed on them.
//!
//! Contours are polygons through the centres of border pixels, in ROI-local
//! pixel coordinates (x to the right, y down). Areas and moments follow the
//! polygon, so a single pixel or a one-pixel-wide line has zero area.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

use super::components::connected_components;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box, inclusive of the extreme pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    pub fn aspect_ratio(&self) -> f64 {
        let long = self.width.max(self.height) as f64;
        let short = self.width.min(self.height).max(1) as f64;
        long / short
    }
}

/// Spatial moments up to second order.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
}

impl Moments {
    pub fn centroid(&self) -> Result<(f64, f64)> {
        if self.m00.abs() < f64::EPSILON {
            return Err(DetectorError::Moments);
        }
        Ok((self.m10 / self.m00, self.m01 / self.m00))
    }

    /// Normalized central moments `(mu20, mu11, mu02)`.
    pub fn central(&self) -> Result<(f64, f64, f64)> {
        let (cx, cy) = self.centroid()?;
        Ok((
            self.m20 / self.m00 - cx * cx,
            self.m11 / self.m00 - cx * cy,
            self.m02 / self.m00 - cy * cy,
        ))
    }
}

/// Ellipse with the same second moments as the contour.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EllipseFit {
    pub center: (f64, f64),
    /// Full major axis length.
    pub major_axis: f64,
    /// Full minor axis length.
    pub minor_axis: f64,
    /// Orientation of the major axis in radians, from the x axis.
    pub angle: f64,
}

/// Ordered boundary polygon of one connected foreground region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour {
    points: Vec<Point>,
}

impl Contour {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Polygon area (shoelace formula), always non-negative.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let twice: i64 = self
            .edges()
            .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
            .sum();
        (twice as f64 / 2.0).abs()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let Some(first) = self.points.first() else {
            return BoundingBox {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            };
        };
        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
        for p in &self.points {
            min_x = min_x.min(p.x);
            max_x = max_x.max(p.x);
            min_y = min_y.min(p.y);
            max_y = max_y.max(p.y);
        }
        BoundingBox {
            x: min_x,
            y: min_y,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        }
    }

    /// Polygon moments via Green's theorem. Orientation is normalized so
    /// `m00` is the non-negative area.
    pub fn moments(&self) -> Moments {
        if self.points.len() < 3 {
            return Moments::default();
        }
        let mut m = Moments::default();
        for (p, q) in self.edges() {
            let (x0, y0, x1, y1) = (p.x as f64, p.y as f64, q.x as f64, q.y as f64);
            let a = x0 * y1 - x1 * y0;
            m.m00 += a;
            m.m10 += a * (x0 + x1);
            m.m01 += a * (y0 + y1);
            m.m20 += a * (x0 * x0 + x0 * x1 + x1 * x1);
            m.m11 += a * (x0 * (2.0 * y0 + y1) + x1 * (y0 + 2.0 * y1));
            m.m02 += a * (y0 * y0 + y0 * y1 + y1 * y1);
        }
        let sign = if m.m00 < 0.0 { -1.0 } else { 1.0 };
        Moments {
            m00: sign * m.m00 / 2.0,
            m10: sign * m.m10 / 6.0,
            m01: sign * m.m01 / 6.0,
            m20: sign * m.m20 / 12.0,
            m11: sign * m.m11 / 24.0,
            m02: sign * m.m02 / 12.0,
        }
    }

    pub fn centroid(&self) -> Result<(f64, f64)> {
        self.moments().centroid()
    }

    /// Moment-equivalent ellipse. Fails on contours without area.
    pub fn fit_ellipse(&self) -> Result<EllipseFit> {
        let moments = self.moments();
        let center = moments.centroid()?;
        let (mu20, mu11, mu02) = moments.central()?;

        let mean = (mu20 + mu02) / 2.0;
        let diff = ((mu20 - mu02) / 2.0).hypot(mu11);
        let lambda_max = mean + diff;
        let lambda_min = (mean - diff).max(0.0);
        if !(lambda_max > 0.0) {
            return Err(DetectorError::Moments);
        }

        Ok(EllipseFit {
            center,
            major_axis: 4.0 * lambda_max.sqrt(),
            minor_axis: 4.0 * lambda_min.sqrt(),
            angle: 0.5 * (2.0 * mu11).atan2(mu20 - mu02),
        })
    }

    /// Consecutive point pairs, closing back to the first point.
    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }
}

/// Neighbour offsets (dx, dy); increasing index is clockwise on screen.
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
const WEST: usize = 4;

fn direction(from: Point, to: Point) -> usize {
    let d = (to.x - from.x, to.y - from.y);
    DIRS.iter().position(|&v| v == d).unwrap_or(WEST)
}

/// Outer contours of every 8-connected foreground region, in raster order
/// of each region's first pixel. Holes are not traced, and a region sitting
/// inside another region's hole is reported as its own contour.
pub fn find_external_contours(mask: &Array2<bool>) -> Vec<Contour> {
    let labeling = connected_components(mask);
    labeling
        .components
        .iter()
        .map(|c| {
            let start = Point::new(c.first.1 as i32, c.first.0 as i32);
            let traced = trace_border(&labeling.labels, c.label, start);
            Contour::new(compress_chain(&traced))
        })
        .collect()
}

/// Follow the outer border of the component `label` starting at its first
/// raster pixel, whose western neighbour is background.
fn trace_border(labels: &Array2<u32>, label: u32, start: Point) -> Vec<Point> {
    let (h, w) = labels.dim();
    let is_fg = |p: Point| {
        p.x >= 0
            && p.y >= 0
            && (p.x as usize) < w
            && (p.y as usize) < h
            && labels[[p.y as usize, p.x as usize]] == label
    };
    let step = |p: Point, d: usize| Point::new(p.x + DIRS[d].0, p.y + DIRS[d].1);

    let first_neighbour = (0..8)
        .map(|k| step(start, (WEST + k) % 8))
        .find(|&p| is_fg(p));
    let Some(second) = first_neighbour else {
        return vec![start];
    };

    let mut points = Vec::new();
    let mut prev = second;
    let mut current = start;
    loop {
        points.push(current);
        let back = direction(current, prev);
        let next = (1..=8)
            .map(|k| step(current, (back + 8 - k) % 8))
            .find(|&p| is_fg(p))
            .unwrap_or(current);
        if next == start && current == second {
            break;
        }
        prev = current;
        current = next;
    }
    points
}

/// Drop points lying in the middle of straight horizontal, vertical or
/// diagonal runs, keeping only the run end points.
pub fn compress_chain(points: &[Point]) -> Vec<Point> {
    let n = points.len();
    if n <= 2 {
        return points.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let cur = points[i];
            let next = points[(i + 1) % n];
            direction(prev, cur) != direction(cur, next)
        })
        .map(|i| points[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn pts(raw: &[(i32, i32)]) -> Vec<Point> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn test_trace_line() {
        let mut labels = Array2::<u32>::zeros((3, 5));
        for x in 1..4 {
            labels[[1, x]] = 1;
        }
        let traced = trace_border(&labels, 1, Point::new(1, 1));
        assert_eq!(traced, pts(&[(1, 1), (2, 1), (3, 1), (2, 1)]));
        assert_eq!(compress_chain(&traced), pts(&[(1, 1), (3, 1)]));
    }

    #[test]
    fn test_trace_square() {
        let mut mask = Array2::from_elem((6, 6), false);
        for y in 1..5 {
            for x in 1..5 {
                mask[[y, x]] = true;
            }
        }
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        let c = &contours[0];
        assert_eq!(c.len(), 4);
        assert_abs_diff_eq!(c.area(), 9.0);
        let bbox = c.bounding_box();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (1, 1, 4, 4));
        let (cx, cy) = c.centroid().unwrap();
        assert_abs_diff_eq!(cx, 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(cy, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_single_pixel_has_no_area() {
        let mut mask = Array2::from_elem((3, 3), false);
        mask[[1, 1]] = true;
        let contours = find_external_contours(&mask);
        assert_eq!(contours[0].points(), &[Point::new(1, 1)]);
        assert_eq!(contours[0].area(), 0.0);
        assert!(contours[0].centroid().is_err());
    }

    #[test]
    fn test_ellipse_fit_of_rectangle() {
        // A w x h rectangle has the same second moments as an ellipse with
        // axes 2w/sqrt(3) x 2h/sqrt(3).
        let c = Contour::new(pts(&[(0, 0), (30, 0), (30, 10), (0, 10)]));
        let fit = c.fit_ellipse().unwrap();
        assert_abs_diff_eq!(fit.major_axis, 60.0 / 3f64.sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(fit.minor_axis, 20.0 / 3f64.sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(fit.angle, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_orientation_does_not_matter() {
        let cw = Contour::new(pts(&[(0, 0), (4, 0), (4, 2), (0, 2)]));
        let ccw = Contour::new(pts(&[(0, 0), (0, 2), (4, 2), (4, 0)]));
        assert_eq!(cw.area(), ccw.area());
        assert_eq!(cw.moments(), ccw.moments());
    }

    #[test]
    fn test_aspect_ratio_guards_zero() {
        let bbox = BoundingBox {
            x: 0,
            y: 0,
            width: 5,
            height: 0,
        };
        assert_eq!(bbox.aspect_ratio(), 5.0);
    }
}
