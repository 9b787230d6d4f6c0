//! Image element referencing an external URL.

use super::Geometry;
use kurbo::{Point, Rect, Vec2};
use serde::{Deserialize, Serialize};

/// Non-destructive display transform applied when painting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFilter {
    #[default]
    None,
    Grayscale,
    Sepia,
    Blur,
    Invert,
    Brightness,
}

impl ImageFilter {
    /// CSS filter expression for web front ends.
    pub fn css(&self) -> &'static str {
        match self {
            ImageFilter::None => "none",
            ImageFilter::Grayscale => "grayscale(100%)",
            ImageFilter::Sepia => "sepia(100%)",
            ImageFilter::Blur => "blur(4px)",
            ImageFilter::Invert => "invert(100%)",
            ImageFilter::Brightness => "brightness(150%)",
        }
    }
}

/// An image placed on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    pub image_url: String,
    #[serde(default)]
    pub filter: ImageFilter,
}

impl Image {
    pub fn new(position: Point, width: f64, height: f64, image_url: String) -> Self {
        Self {
            position,
            width,
            height,
            image_url,
            filter: ImageFilter::None,
        }
    }
}

impl Geometry for Image {
    fn bounds(&self) -> Rect {
        Rect::from_origin_size(self.position, (self.width, self.height))
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

    fn resize(&mut self, width: Option<f64>, height: Option<f64>) {
        if let Some(w) = width {
            self.width = w;
        }
        if let Some(h) = height {
            self.height = h;
        }
    }
}
