// ============================================================================
// LAYER MODEL — one visual element per layer, ordered bottom-to-top
// ============================================================================
//
// Layers are values: nothing mutates a layer's fields in place.  Every edit
// builds a new `Layer` (see the `with_*` helpers) and replaces the old one at
// its index, so a cloned `LayerStack` is always a safe history snapshot.
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adjust::AdjustmentSet;
use crate::error::{EditorError, Result};

/// Id given to the layer that seeds every edit session.
pub const BASE_LAYER_ID: &str = "base-image";

// ============================================================================
// IDENTIFIERS & COLORS
// ============================================================================

/// Unique identifier, stable for the layer's lifetime.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    /// Fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn base() -> Self {
        Self(BASE_LAYER_ID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Straight (non-premultiplied) RGBA8 color.  Serialized as a CSS hex string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Same color with its alpha scaled by `factor` (0..1).
    pub fn scale_alpha(self, factor: f32) -> Self {
        let a = (self.a as f32 * factor.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => Some(Self::rgb(nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17)),
            6 => Some(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_hex(s).ok_or_else(|| format!("invalid color '{s}'"))
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// Pixel-combination function used when compositing a layer over what is beneath it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
}

impl BlendMode {
    /// Returns all blend modes for panel display
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
        }
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BlendMode::all()
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown blend mode '{s}'"))
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// One freehand stroke: a connected polyline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub points: Vec<Point>,
    pub color: Color,
    pub width: f32,
}

impl Stroke {
    pub fn new(start: Point, color: Color, width: f32) -> Self {
        Self { points: vec![start], color, width }
    }
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawingPayload {
    pub strokes: Vec<Stroke>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    /// Circle inscribed in the bounding box.
    Circle,
    /// Straight line across the bounding box diagonal, from (x, y) to (x + w, y + h).
    Line,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapePayload {
    pub kind: ShapeKind,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Color,
    pub stroke_width: f32,
}

impl ShapePayload {
    /// Geometry for a press-drag-release from `start` to `end`.
    ///
    /// Rectangles and circles get a normalised box; lines keep their signed
    /// extent so they run from the press point to the release point.
    /// Returns `None` for a drag that never moved.
    pub fn from_drag(
        kind: ShapeKind,
        start: Point,
        end: Point,
        color: Color,
        stroke_width: f32,
    ) -> Option<Self> {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        if dx == 0.0 && dy == 0.0 {
            return None;
        }
        let (x, y, width, height) = match kind {
            ShapeKind::Line => (start.x, start.y, dx, dy),
            ShapeKind::Rectangle | ShapeKind::Circle => {
                if dx == 0.0 || dy == 0.0 {
                    return None;
                }
                (start.x.min(end.x), start.y.min(end.y), dx.abs(), dy.abs())
            }
        };
        Some(Self { kind, x, y, width, height, color, stroke_width })
    }
}

/// Horizontal text alignment relative to the anchor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlignment {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextPayload {
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub font: String,
    pub size: f32,
    pub color: Color,
    #[serde(default)]
    pub align: TextAlignment,
    /// Degrees, clockwise.
    #[serde(default)]
    pub rotation: f32,
}

/// Where an image layer's pixels come from.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageSource {
    /// A file path or `file://` URI, decoded asynchronously.
    Uri(String),
    /// Encoded bytes held in memory (PNG, JPEG, …), decoded asynchronously.
    #[serde(skip)]
    Encoded(Arc<Vec<u8>>),
    /// Already-decoded raster.
    #[serde(skip)]
    Raster(Arc<RgbaImage>),
}

impl ImageSource {
    pub fn raster(img: RgbaImage) -> Self {
        ImageSource::Raster(Arc::new(img))
    }

    pub fn needs_decode(&self) -> bool {
        !matches!(self, ImageSource::Raster(_))
    }
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            ImageSource::Encoded(bytes) => write!(f, "Encoded({} bytes)", bytes.len()),
            ImageSource::Raster(img) => write!(f, "Raster({}x{})", img.width(), img.height()),
        }
    }
}

impl PartialEq for ImageSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ImageSource::Uri(a), ImageSource::Uri(b)) => a == b,
            (ImageSource::Encoded(a), ImageSource::Encoded(b)) => Arc::ptr_eq(a, b) || a == b,
            (ImageSource::Raster(a), ImageSource::Raster(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw())
            }
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub source: ImageSource,
}

/// Kind-specific payload of a layer, serialized as `{"kind": .., "data": {..}}`.
/// The payload sits under its own key because shape payloads carry a `kind`
/// of their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "lowercase")]
pub enum LayerContent {
    Image(ImagePayload),
    Drawing(DrawingPayload),
    Shape(ShapePayload),
    Text(TextPayload),
    /// Applies its adjustment set to everything composited beneath it.
    Adjustment(AdjustmentSet),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Image,
    Drawing,
    Shape,
    Text,
    Adjustment,
}

impl LayerKind {
    pub fn label(&self) -> &'static str {
        match self {
            LayerKind::Image => "Image",
            LayerKind::Drawing => "Drawing",
            LayerKind::Shape => "Shape",
            LayerKind::Text => "Text",
            LayerKind::Adjustment => "Adjustment",
        }
    }
}

impl LayerContent {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerContent::Image(_) => LayerKind::Image,
            LayerContent::Drawing(_) => LayerKind::Drawing,
            LayerContent::Shape(_) => LayerKind::Shape,
            LayerContent::Text(_) => LayerKind::Text,
            LayerContent::Adjustment(_) => LayerKind::Adjustment,
        }
    }
}

// ============================================================================
// LAYER
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub content: LayerContent,
    pub opacity: f32,
    #[serde(default)]
    pub blend_mode: BlendMode,
    pub visible: bool,
    /// Advisory: the interaction controller never edits a locked layer.
    #[serde(default)]
    pub locked: bool,
}

impl Layer {
    pub fn new(content: LayerContent) -> Self {
        Self {
            id: LayerId::new(),
            name: content.kind().label().to_string(),
            content,
            opacity: 1.0,
            blend_mode: BlendMode::Normal,
            visible: true,
            locked: false,
        }
    }

    pub fn image(source: ImageSource) -> Self {
        Self::new(LayerContent::Image(ImagePayload { source }))
    }

    /// The locked image layer that seeds an edit session.
    pub fn base_image(source: ImageSource) -> Self {
        Self {
            id: LayerId::base(),
            name: "Background".to_string(),
            locked: true,
            ..Self::image(source)
        }
    }

    pub fn drawing(payload: DrawingPayload) -> Self {
        Self::new(LayerContent::Drawing(payload))
    }

    pub fn shape(payload: ShapePayload) -> Self {
        Self::new(LayerContent::Shape(payload))
    }

    pub fn text(payload: TextPayload) -> Self {
        Self::new(LayerContent::Text(payload))
    }

    pub fn adjustment(set: AdjustmentSet) -> Self {
        Self::new(LayerContent::Adjustment(set))
    }

    pub fn kind(&self) -> LayerKind {
        self.content.kind()
    }

    pub fn with_id(self, id: LayerId) -> Self {
        Self { id, ..self }
    }

    pub fn with_name(self, name: impl Into<String>) -> Self {
        Self { name: name.into(), ..self }
    }

    /// Callers clamp with [`clamp_opacity`] first; the model stores what it is given.
    pub fn with_opacity(self, opacity: f32) -> Self {
        Self { opacity, ..self }
    }

    pub fn with_blend_mode(self, blend_mode: BlendMode) -> Self {
        Self { blend_mode, ..self }
    }

    pub fn with_visible(self, visible: bool) -> Self {
        Self { visible, ..self }
    }

    pub fn with_locked(self, locked: bool) -> Self {
        Self { locked, ..self }
    }

    pub fn with_content(self, content: LayerContent) -> Self {
        Self { content, ..self }
    }

    /// Copy of this layer shifted by (dx, dy).  `None` for kinds without a
    /// position of their own (images and adjustments).
    pub fn translated(&self, dx: f32, dy: f32) -> Option<Self> {
        let content = match &self.content {
            LayerContent::Drawing(d) => LayerContent::Drawing(DrawingPayload {
                strokes: d
                    .strokes
                    .iter()
                    .map(|s| Stroke {
                        points: s.points.iter().map(|p| Point::new(p.x + dx, p.y + dy)).collect(),
                        ..s.clone()
                    })
                    .collect(),
            }),
            LayerContent::Shape(s) => LayerContent::Shape(ShapePayload {
                x: s.x + dx,
                y: s.y + dy,
                ..s.clone()
            }),
            LayerContent::Text(t) => LayerContent::Text(TextPayload {
                x: t.x + dx,
                y: t.y + dy,
                ..t.clone()
            }),
            LayerContent::Image(_) | LayerContent::Adjustment(_) => return None,
        };
        Some(self.clone().with_content(content))
    }

    /// Rough heap footprint, used for history memory limits.
    pub fn memory_bytes(&self) -> usize {
        let payload = match &self.content {
            // Rasters are shared between snapshots; count the handle only.
            LayerContent::Image(_) => std::mem::size_of::<ImagePayload>(),
            LayerContent::Drawing(d) => d
                .strokes
                .iter()
                .map(|s| s.points.len() * std::mem::size_of::<Point>() + std::mem::size_of::<Stroke>())
                .sum(),
            LayerContent::Shape(_) => std::mem::size_of::<ShapePayload>(),
            LayerContent::Text(t) => t.content.len() + t.font.len() + std::mem::size_of::<TextPayload>(),
            LayerContent::Adjustment(_) => std::mem::size_of::<AdjustmentSet>(),
        };
        payload + self.name.len() + self.id.as_str().len() + std::mem::size_of::<Layer>()
    }
}

/// Clamp an externally supplied opacity into [0, 1].  NaN maps to fully opaque.
pub fn clamp_opacity(value: f32) -> f32 {
    if value.is_nan() { 1.0 } else { value.clamp(0.0, 1.0) }
}

// ============================================================================
// LAYER STACK
// ============================================================================

/// Ordered layers (index 0 = bottom) plus the current-layer index.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerStack {
    layers: Vec<Layer>,
    current: usize,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layers(layers: Vec<Layer>) -> Self {
        let current = layers.len().saturating_sub(1);
        Self { layers, current }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Layer> {
        self.layers.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The layer the interaction controller edits; `None` on an empty stack.
    pub fn current(&self) -> Option<&Layer> {
        self.layers.get(self.current)
    }

    pub fn position(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| &l.id == id)
    }

    pub fn find(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.layers.len() {
            Ok(())
        } else {
            Err(EditorError::InvalidMutation { index, len: self.layers.len() })
        }
    }

    /// Append on top and make it current.
    pub fn push(&mut self, layer: Layer) {
        self.layers.push(layer);
        self.current = self.layers.len() - 1;
    }

    /// Insert at `index` (`index == len` appends) and make it current.
    pub fn insert(&mut self, index: usize, layer: Layer) -> Result<()> {
        if index > self.layers.len() {
            return Err(EditorError::InvalidMutation { index, len: self.layers.len() });
        }
        self.layers.insert(index, layer);
        self.current = index;
        Ok(())
    }

    /// Swap in a new value for the layer at `index`.
    pub fn replace(&mut self, index: usize, layer: Layer) -> Result<()> {
        self.check(index)?;
        self.layers[index] = layer;
        Ok(())
    }

    /// Delete the layer at `index`; the current index stays on the same
    /// layer when possible, otherwise on its nearest surviving neighbour.
    pub fn remove(&mut self, index: usize) -> Result<Layer> {
        self.check(index)?;
        let removed = self.layers.remove(index);
        if self.current > index {
            self.current -= 1;
        }
        self.current = self.current.min(self.layers.len().saturating_sub(1));
        Ok(removed)
    }

    /// Reorder: take the layer at `from` and re-insert it at `to`.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        if from == to {
            return Ok(());
        }
        let current_id = self.current().map(|l| l.id.clone());
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        if let Some(id) = current_id
            && let Some(pos) = self.position(&id)
        {
            self.current = pos;
        }
        Ok(())
    }

    pub fn set_current(&mut self, index: usize) -> Result<()> {
        self.check(index)?;
        self.current = index;
        Ok(())
    }

    pub fn memory_bytes(&self) -> usize {
        self.layers.iter().map(Layer::memory_bytes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape_layer(x: f32) -> Layer {
        Layer::shape(ShapePayload {
            kind: ShapeKind::Rectangle,
            x,
            y: 0.0,
            width: 4.0,
            height: 4.0,
            color: Color::BLACK,
            stroke_width: 1.0,
        })
    }

    #[test]
    fn hex_colors_parse_and_print() {
        assert_eq!(Color::from_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::from_hex("#FF0000"), Some(Color::rgb(255, 0, 0)));
        assert_eq!(Color::from_hex("00ff0080"), Some(Color::rgba(0, 255, 0, 128)));
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("#zzzzzz"), None);
        assert_eq!(Color::rgb(1, 2, 3).to_hex(), "#010203");
        assert_eq!(Color::rgba(1, 2, 3, 4).to_hex(), "#01020304");
    }

    #[test]
    fn opacity_clamp_handles_out_of_range_and_nan() {
        assert_eq!(clamp_opacity(-0.5), 0.0);
        assert_eq!(clamp_opacity(1.7), 1.0);
        assert_eq!(clamp_opacity(0.25), 0.25);
        assert_eq!(clamp_opacity(f32::NAN), 1.0);
        assert_eq!(clamp_opacity(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn push_makes_new_layer_current() {
        let mut stack = LayerStack::new();
        assert!(stack.current().is_none());
        stack.push(shape_layer(0.0));
        stack.push(shape_layer(1.0));
        assert_eq!(stack.current_index(), 1);
    }

    #[test]
    fn remove_fixes_up_current_index() {
        let mut stack = LayerStack::from_layers(vec![shape_layer(0.0), shape_layer(1.0), shape_layer(2.0)]);
        assert_eq!(stack.current_index(), 2);

        // Deleting the current top layer moves current to the new top.
        stack.remove(2).unwrap();
        assert_eq!(stack.current_index(), 1);

        // Deleting below current shifts current down with its layer.
        let current_id = stack.current().unwrap().id.clone();
        stack.remove(0).unwrap();
        assert_eq!(stack.current().unwrap().id, current_id);

        stack.remove(0).unwrap();
        assert!(stack.is_empty());
        assert_eq!(stack.current_index(), 0);
        assert!(stack.current().is_none());
    }

    #[test]
    fn out_of_range_mutations_are_rejected_without_change() {
        let mut stack = LayerStack::from_layers(vec![shape_layer(0.0)]);
        let before = stack.clone();
        assert!(matches!(
            stack.replace(3, shape_layer(9.0)),
            Err(EditorError::InvalidMutation { index: 3, len: 1 })
        ));
        assert!(stack.remove(1).is_err());
        assert!(stack.move_layer(0, 5).is_err());
        assert!(stack.set_current(2).is_err());
        assert!(stack.insert(4, shape_layer(1.0)).is_err());
        assert_eq!(stack, before);
    }

    #[test]
    fn move_layer_keeps_current_on_same_layer() {
        let mut stack = LayerStack::from_layers(vec![shape_layer(0.0), shape_layer(1.0), shape_layer(2.0)]);
        stack.set_current(0).unwrap();
        let id = stack.current().unwrap().id.clone();
        stack.move_layer(0, 2).unwrap();
        assert_eq!(stack.current_index(), 2);
        assert_eq!(stack.current().unwrap().id, id);
    }

    #[test]
    fn drag_geometry_normalises_boxes_but_not_lines() {
        let rect = ShapePayload::from_drag(
            ShapeKind::Rectangle,
            Point::new(30.0, 40.0),
            Point::new(10.0, 10.0),
            Color::BLACK,
            2.0,
        )
        .unwrap();
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (10.0, 10.0, 20.0, 30.0));

        let line = ShapePayload::from_drag(
            ShapeKind::Line,
            Point::new(30.0, 40.0),
            Point::new(10.0, 40.0),
            Color::BLACK,
            2.0,
        )
        .unwrap();
        assert_eq!((line.x, line.y, line.width, line.height), (30.0, 40.0, -20.0, 0.0));

        assert!(ShapePayload::from_drag(
            ShapeKind::Circle,
            Point::new(5.0, 5.0),
            Point::new(5.0, 5.0),
            Color::BLACK,
            1.0
        )
        .is_none());
    }

    #[test]
    fn translated_moves_geometry_and_keeps_identity() {
        let layer = shape_layer(1.0);
        let moved = layer.translated(2.0, 3.0).unwrap();
        assert_eq!(moved.id, layer.id);
        match moved.content {
            LayerContent::Shape(s) => assert_eq!((s.x, s.y), (3.0, 3.0)),
            _ => panic!("expected shape"),
        }
        assert!(Layer::image(ImageSource::Uri("a.png".into())).translated(1.0, 1.0).is_none());
    }

    #[test]
    fn layers_serialize_with_kind_tags() {
        let layer = shape_layer(0.0).with_blend_mode(BlendMode::Multiply);
        let json = serde_json::to_string(&layer).unwrap();
        assert!(json.contains("\"kind\":\"shape\""));
        assert!(json.contains("\"kind\":\"rectangle\""));
        assert!(json.contains("\"blend_mode\":\"multiply\""));
        let back: Layer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layer);
    }

    #[test]
    fn every_layer_kind_survives_json() {
        let mut stroke = Stroke::new(Point::new(1.0, 2.0), Color::rgb(10, 20, 30), 3.0);
        stroke.points.push(Point::new(5.0, 6.0));
        let layers = [
            Layer::image(ImageSource::Uri("file:///tmp/photo.png".into())).with_opacity(0.5),
            Layer::drawing(DrawingPayload { strokes: vec![stroke] }),
            shape_layer(3.0),
            Layer::text(TextPayload {
                content: "Caption".into(),
                x: 4.0,
                y: 20.0,
                font: "sans-serif".into(),
                size: 18.0,
                color: Color::WHITE,
                align: TextAlignment::Center,
                rotation: 30.0,
            }),
            Layer::adjustment(AdjustmentSet::default().with(crate::adjust::Adjustment::Sepia, 40.0)),
        ];
        for layer in layers {
            let json = serde_json::to_string(&layer).unwrap();
            let back: Layer = serde_json::from_str(&json).unwrap_or_else(|e| panic!("{json}: {e}"));
            assert_eq!(back, layer);
            assert_eq!(back.content.kind(), layer.content.kind());
        }
    }

    #[test]
    fn hand_written_shape_layer_parses() {
        let json = r##"{
            "id": "layer-7", "name": "Box", "opacity": 1.0, "visible": true,
            "content": {"kind": "shape", "data": {
                "kind": "circle", "x": 1, "y": 2, "width": 8, "height": 6,
                "color": "#ff0000", "stroke_width": 2
            }}
        }"##;
        let layer: Layer = serde_json::from_str(json).unwrap();
        match layer.content {
            LayerContent::Shape(shape) => {
                assert_eq!(shape.kind, ShapeKind::Circle);
                assert_eq!((shape.width, shape.height), (8.0, 6.0));
            }
            other => panic!("parsed as {:?}", other.kind()),
        }
        assert_eq!(layer.blend_mode, BlendMode::Normal);
        assert!(!layer.locked);
    }
}
