//! Straight line element.

use super::Geometry;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// A straight segment. Hit-tested against its bounding box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub start: Point,
    pub end: Point,
}

impl Line {
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }
}

impl Geometry for Line {
    fn bounds(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }

    fn hit_test(&self, point: Point, _threshold: f64) -> bool {
        let b = self.bounds();
        point.x >= b.x0 && point.x <= b.x1 && point.y >= b.y0 && point.y <= b.y1
    }

    fn position(&self) -> Point {
        self.start
    }

    fn translate(&mut self, offset: Vec2) {
        self.start += offset;
        self.end += offset;
    }

    /// Width and height are the signed extent from start to end.
    fn resize(&mut self, width: Option<f64>, height: Option<f64>) {
        if let Some(w) = width {
            self.end.x = self.start.x + w;
        }
        if let Some(h) = height {
            self.end.y = self.start.y + h;
        }
    }
}
