//! Element definitions for the collaborative canvas.

mod circle;
mod image;
mod line;
mod patch;
mod pen;
mod rectangle;
mod text;

pub use circle::Circle;
pub use image::{Image, ImageFilter};
pub use line::Line;
pub use patch::ElementPatch;
pub use pen::PenStroke;
pub use rectangle::Rectangle;
pub use text::Text;

use kurbo::{Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Parse a CSS-style hex color (`#rgb`, `#rrggbb`, `#rrggbbaa`).
    pub fn from_hex(color: &str) -> Option<Self> {
        let hex = color.trim().strip_prefix('#')?;
        // Byte slicing below needs single-byte chars
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => Some(Self::new(
                channel(&hex[0..1])? * 17,
                channel(&hex[1..2])? * 17,
                channel(&hex[2..3])? * 17,
                255,
            )),
            6 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                255,
            )),
            8 => Some(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            _ => None,
        }
    }

    /// Format as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Presentation attributes shared by every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStyle {
    pub color: SerializableColor,
    pub stroke_size: f64,
}

impl ElementStyle {
    /// Get the color as a peniko Color for painting.
    pub fn color(&self) -> Color {
        self.color.into()
    }
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            color: SerializableColor::black(),
            stroke_size: 2.0,
        }
    }
}

/// Geometry behaviour common to every element variant.
pub trait Geometry {
    /// Axis-aligned bounds in canvas coordinates.
    fn bounds(&self) -> Rect;

    /// Check if a point hits this geometry.
    ///
    /// `threshold` only matters for stroke-like geometry.
    fn hit_test(&self, point: Point, threshold: f64) -> bool;

    /// Anchor position (top-left for bounded shapes, origin for strokes).
    fn position(&self) -> Point;

    /// Move the geometry by an offset.
    fn translate(&mut self, offset: Vec2);

    /// Change the extent. Geometry without an extent ignores this.
    fn resize(&mut self, _width: Option<f64>, _height: Option<f64>) {}
}

/// Distance from a point to a line segment (a→b).
pub fn point_to_segment_dist(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + seg * t;
    point.distance(proj)
}

/// Minimum distance from a point to a polyline.
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| point_to_segment_dist(point, w[0], w[1]))
        .fold(f64::INFINITY, f64::min)
}

/// Per-variant geometry, tagged by `type` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementKind {
    Rectangle(Rectangle),
    #[serde(alias = "ellipse")]
    Circle(Circle),
    Line(Line),
    Pen(PenStroke),
    Text(Text),
    Image(Image),
}

impl ElementKind {
    fn geometry(&self) -> &dyn Geometry {
        match self {
            ElementKind::Rectangle(g) => g,
            ElementKind::Circle(g) => g,
            ElementKind::Line(g) => g,
            ElementKind::Pen(g) => g,
            ElementKind::Text(g) => g,
            ElementKind::Image(g) => g,
        }
    }

    fn geometry_mut(&mut self) -> &mut dyn Geometry {
        match self {
            ElementKind::Rectangle(g) => g,
            ElementKind::Circle(g) => g,
            ElementKind::Line(g) => g,
            ElementKind::Pen(g) => g,
            ElementKind::Text(g) => g,
            ElementKind::Image(g) => g,
        }
    }

    /// Name of the variant as it appears on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            ElementKind::Rectangle(_) => "rectangle",
            ElementKind::Circle(_) => "circle",
            ElementKind::Line(_) => "line",
            ElementKind::Pen(_) => "pen",
            ElementKind::Text(_) => "text",
            ElementKind::Image(_) => "image",
        }
    }
}

/// A single placeable object on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Nil when the producer did not assign one; the store fills it in.
    #[serde(default)]
    pub id: ElementId,
    /// Label shown in the layer panel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub style: ElementStyle,
    #[serde(flatten)]
    pub kind: ElementKind,
}

impl Element {
    /// Create an element with a fresh id and default style.
    pub fn new(kind: ElementKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            style: ElementStyle::default(),
            kind,
        }
    }

    pub fn rectangle(position: Point, width: f64, height: f64) -> Self {
        Self::new(ElementKind::Rectangle(Rectangle::new(position, width, height)))
    }

    pub fn circle(position: Point, width: f64, height: f64) -> Self {
        Self::new(ElementKind::Circle(Circle::new(position, width, height)))
    }

    pub fn line(start: Point, end: Point) -> Self {
        Self::new(ElementKind::Line(Line::new(start, end)))
    }

    pub fn text(position: Point, content: impl Into<String>) -> Self {
        Self::new(ElementKind::Text(Text::new(position, content.into())))
    }

    pub fn image(position: Point, width: f64, height: f64, image_url: impl Into<String>) -> Self {
        Self::new(ElementKind::Image(Image::new(
            position,
            width,
            height,
            image_url.into(),
        )))
    }

    pub fn pen(stroke: PenStroke) -> Self {
        Self::new(ElementKind::Pen(stroke))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_style(mut self, style: ElementStyle) -> Self {
        self.style = style;
        self
    }

    pub fn bounds(&self) -> Rect {
        self.kind.geometry().bounds()
    }

    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    pub fn position(&self) -> Point {
        self.kind.geometry().position()
    }

    pub fn hit_test(&self, point: Point, threshold: f64) -> bool {
        self.kind.geometry().hit_test(point, threshold)
    }

    /// Whether the element is complete enough to be painted.
    pub fn is_renderable(&self) -> bool {
        match &self.kind {
            ElementKind::Pen(stroke) => stroke.len() >= 2,
            _ => true,
        }
    }

    /// Merge a patch into this element.
    /// Returns true if anything changed.
    pub fn apply(&mut self, patch: &ElementPatch) -> bool {
        let before = self.clone();

        if patch.x.is_some() || patch.y.is_some() {
            let current = self.position();
            let target = Point::new(
                patch.x.unwrap_or(current.x),
                patch.y.unwrap_or(current.y),
            );
            self.kind.geometry_mut().translate(target - current);
        }
        if patch.width.is_some() || patch.height.is_some() {
            self.kind.geometry_mut().resize(patch.width, patch.height);
        }

        if let Some(color) = patch.color {
            self.style.color = color;
        }
        if let Some(stroke_size) = patch.stroke_size {
            self.style.stroke_size = stroke_size;
        }
        if let Some(name) = &patch.name {
            self.name = if name.is_empty() { None } else { Some(name.clone()) };
        }

        match &mut self.kind {
            ElementKind::Text(text) => {
                if let Some(content) = &patch.content {
                    text.content = content.clone();
                }
                if let Some(font_size) = patch.font_size {
                    text.font_size = font_size;
                }
            }
            ElementKind::Image(image) => {
                if let Some(url) = &patch.image_url {
                    image.image_url = url.clone();
                }
                if let Some(filter) = patch.filter {
                    image.filter = filter;
                }
            }
            _ => {}
        }

        *self != before
    }
}
