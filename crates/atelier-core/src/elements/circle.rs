//! Circle element.

use super::Geometry;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// A circle inscribed in its bounding box.
///
/// The radius is half of the smaller side, so a non-square box still hit-tests
/// as a circle centered in the box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    /// Top-left corner of the bounding box.
    pub position: Point,
    pub width: f64,
    pub height: f64,
}

impl Circle {
    pub fn new(position: Point, width: f64, height: f64) -> Self {
        Self {
            position,
            width,
            height,
        }
    }

    /// Create a circle from its center and radius.
    pub fn from_center(center: Point, radius: f64) -> Self {
        Self::new(
            Point::new(center.x - radius, center.y - radius),
            radius * 2.0,
            radius * 2.0,
        )
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.position.x + self.width / 2.0,
            self.position.y + self.height / 2.0,
        )
    }

    pub fn radius(&self) -> f64 {
        self.width.abs().min(self.height.abs()) / 2.0
    }
}

impl Geometry for Circle {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
    }

    fn hit_test(&self, point: Point, _threshold: f64) -> bool {
        point.distance(self.center()) <= self.radius()
    }

    fn position(&self) -> Point {
        self.position
    }

    fn translate(&mut self, offset: Vec2) {
        self.position += offset;
    }

    fn resize(&mut self, width: Option<f64>, height: Option<f64>) {
        if let Some(w) = width {
            self.width = w;
        }
        if let Some(h) = height {
            self.height = h;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_test_uses_radius() {
        let circle = Circle::from_center(Point::new(50.0, 50.0), 10.0);
        assert!(circle.hit_test(Point::new(50.0, 50.0), 0.0));
        assert!(circle.hit_test(Point::new(60.0, 50.0), 0.0));
        // Inside the bounding box corner but outside the circle
        assert!(!circle.hit_test(Point::new(41.0, 41.0), 0.0));
    }

    #[test]
    fn test_radius_of_non_square_box() {
        let circle = Circle::new(Point::new(0.0, 0.0), 40.0, 20.0);
        assert!((circle.radius() - 10.0).abs() < f64::EPSILON);
        assert_eq!(circle.center(), Point::new(20.0, 10.0));
    }
}
