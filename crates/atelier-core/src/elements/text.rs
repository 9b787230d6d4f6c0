//! Text element.

use super::Geometry;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// A text label anchored at its top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub position: Point,
    pub content: String,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_font_size() -> f64 {
    Text::DEFAULT_FONT_SIZE
}

impl Text {
    pub const DEFAULT_FONT_SIZE: f64 = 20.0;

    pub fn new(position: Point, content: String) -> Self {
        Self {
            position,
            content,
            font_size: Self::DEFAULT_FONT_SIZE,
        }
    }

    /// Approximate width without a layout engine.
    pub fn approximate_width(&self) -> f64 {
        let longest = self
            .content
            .lines()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        longest as f64 * self.font_size * 0.6
    }

    pub fn approximate_height(&self) -> f64 {
        let lines = self.content.lines().count().max(1);
        lines as f64 * self.font_size * 1.2
    }
}

impl Geometry for Text {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(
            self.position,
            (self.approximate_width().max(20.0), self.approximate_height()),
        )
    }

    fn hit_test(&self, point: Point, _threshold: f64) -> bool {
        let b = self.bounds();
        point.x >= b.x0 && point.x <= b.x1 && point.y >= b.y0 && point.y <= b.y1
    }

    fn position(&self) -> Point {
        self.position
    }

    fn translate(&mut self, offset: Vec2) {
        self.position += offset;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_bounds() {
        let text = Text::new(Point::new(0.0, 0.0), "ab\nabcd".to_string());
        let bounds = text.bounds();
        assert!((bounds.width() - 4.0 * 20.0 * 0.6).abs() < 1e-9);
        assert!((bounds.height() - 2.0 * 20.0 * 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_empty_text_still_hittable() {
        let text = Text::new(Point::new(0.0, 0.0), String::new());
        assert!(text.hit_test(Point::new(10.0, 10.0), 0.0));
    }
}
