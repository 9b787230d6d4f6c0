//! Freehand pen stroke.

use super::{Geometry, point_to_polyline_dist};
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// A freehand stroke. Points are stored relative to `origin`, so moving the
/// stroke only touches the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenStroke {
    pub origin: Point,
    points: Vec<Point>,
}

impl PenStroke {
    /// Start a stroke with no points yet.
    pub fn new(origin: Point) -> Self {
        Self {
            origin,
            points: Vec::new(),
        }
    }

    /// Build a finished stroke from absolute canvas points.
    /// The first point becomes the origin.
    pub fn from_points(points: &[Point]) -> Self {
        let origin = points.first().copied().unwrap_or(Point::ORIGIN);
        let mut stroke = Self::new(origin);
        for &p in points {
            stroke.push(p);
        }
        stroke
    }

    /// Append an absolute point while the gesture is in progress.
    pub(crate) fn push(&mut self, point: Point) {
        self.points.push((point - self.origin).to_point());
    }

    /// Points relative to the origin.
    pub fn relative_points(&self) -> &[Point] {
        &self.points
    }

    /// Points in canvas coordinates.
    pub fn absolute_points(&self) -> Vec<Point> {
        let offset = self.origin.to_vec2();
        self.points.iter().map(|p| *p + offset).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl Geometry for PenStroke {
    fn bounds(&self) -> Rect {
        let mut points = self.absolute_points().into_iter();
        let Some(first) = points.next() else {
            return Rect::from_origin_size(self.origin, (0.0, 0.0));
        };
        points.fold(Rect::from_points(first, first), |r, p| r.union_pt(p))
    }

    fn hit_test(&self, point: Point, threshold: f64) -> bool {
        // A stroke with fewer than two points is never rendered, so never hit.
        if self.points.len() < 2 {
            return false;
        }
        point_to_polyline_dist(point, &self.absolute_points()) <= threshold
    }

    fn position(&self) -> Point {
        self.origin
    }

    fn translate(&mut self, offset: Vec2) {
        self.origin += offset;
    }
}
