//! Normalized-frame geometry.
//!
//! All coordinates live in the unit square `[0,1] x [0,1]` with the origin at
//! the top-left corner of the camera frame.

use serde::{Deserialize, Serialize};

/// A point in normalized frame coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle stored as origin plus extent.
///
/// The all-zero rectangle is the "unset" value for zones that are not complete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Min/max envelope of a set of points. Returns the degenerate rect for
    /// an empty slice.
    pub fn envelope(points: &[Point]) -> Self {
        let Some(first) = points.first() else {
            return Self::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Self {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn x_min(&self) -> f32 {
        self.x
    }

    pub fn x_max(&self) -> f32 {
        self.x + self.width
    }

    pub fn y_min(&self) -> f32 {
        self.y
    }

    pub fn y_max(&self) -> f32 {
        self.y + self.height
    }

    /// True when the rect has no area along either axis.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Express `p` in this rect's local frame without clamping.
    pub fn localize(&self, p: Point) -> Point {
        Point {
            x: inverse_lerp(self.x_min(), self.x_max(), p.x),
            y: inverse_lerp(self.y_min(), self.y_max(), p.y),
        }
    }
}

/// Unclamped inverse linear interpolation. A zero-width interval maps to 0.
pub fn inverse_lerp(a: f32, b: f32, value: f32) -> f32 {
    if a == b {
        return 0.0;
    }
    (value - a) / (b - a)
}

/// Even-odd ray casting test.
///
/// Edges are walked as `(polygon[i], polygon[j])` with `j = i - 1` wrapping.
/// Points exactly on an edge resolve by the strict `>` comparisons below and
/// are not otherwise guaranteed.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    if n == 0 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let pi = polygon[i];
        let pj = polygon[j];
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<Point> {
        vec![
            Point::new(0.1, 0.1),
            Point::new(0.5, 0.1),
            Point::new(0.5, 0.5),
            Point::new(0.1, 0.5),
        ]
    }

    #[test]
    fn envelope_covers_all_points() {
        let pts = vec![
            Point::new(0.4, 0.2),
            Point::new(0.8, 0.3),
            Point::new(0.7, 0.9),
            Point::new(0.3, 0.6),
        ];
        let rect = Rect::envelope(&pts);
        assert_eq!(rect.x_min(), 0.3);
        assert_eq!(rect.y_min(), 0.2);
        assert!((rect.x_max() - 0.8).abs() < 1e-6);
        assert!((rect.y_max() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn empty_envelope_is_degenerate() {
        assert!(Rect::envelope(&[]).is_degenerate());
        assert_eq!(Rect::envelope(&[]), Rect::default());
    }

    #[test]
    fn point_in_square() {
        assert!(point_in_polygon(Point::new(0.3, 0.3), &square()));
        assert!(!point_in_polygon(Point::new(0.9, 0.9), &square()));
        assert!(!point_in_polygon(Point::new(0.05, 0.3), &square()));
    }

    #[test]
    fn point_in_skewed_quad() {
        let quad = vec![
            Point::new(0.2, 0.1),
            Point::new(0.8, 0.2),
            Point::new(0.6, 0.8),
            Point::new(0.1, 0.6),
        ];
        assert!(point_in_polygon(Point::new(0.45, 0.45), &quad));
        // Inside the envelope, outside the polygon.
        assert!(!point_in_polygon(Point::new(0.12, 0.15), &quad));
    }

    #[test]
    fn empty_polygon_contains_nothing() {
        assert!(!point_in_polygon(Point::new(0.5, 0.5), &[]));
    }

    #[test]
    fn inverse_lerp_is_unclamped() {
        assert_eq!(inverse_lerp(0.0, 2.0, 1.0), 0.5);
        assert_eq!(inverse_lerp(0.0, 1.0, 1.5), 1.5);
        assert_eq!(inverse_lerp(0.0, 1.0, -0.5), -0.5);
        assert_eq!(inverse_lerp(0.3, 0.3, 0.9), 0.0);
    }
}
