// ============================================================================
// EDITOR — the single mutable state object; every transition is an Action
// ============================================================================
//
// History rules:
//   * a discrete edit outside a gesture records one snapshot before it runs
//   * a gesture captures its snapshot on begin and pushes it on commit, only
//     when the stack actually changed
//   * a cancelled gesture restores its snapshot and records nothing
// ============================================================================

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::adjust::{Adjustment, AdjustmentSet, TransformState};
use crate::compositor::{CompositeOutput, Compositor};
use crate::controller::Tool;
use crate::decode::{DecodeState, ImageCache};
use crate::error::{EditorError, Result};
use crate::history::{HistoryManager, Snapshot};
use crate::io::{self, ExportFormat};
use crate::layer::{
    BlendMode, Color, DrawingPayload, ImageSource, Layer, LayerContent, LayerId, LayerStack, Point,
    ShapePayload, Stroke, TextAlignment, TextPayload, clamp_opacity,
};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushSettings {
    pub size: f32,
    pub color: Color,
    pub opacity: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextSettings {
    pub font: String,
    pub size: f32,
    pub color: Color,
    pub align: TextAlignment,
}

/// Partial update of a layer's fields; `None` leaves a field as it is.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub opacity: Option<f32>,
    pub blend_mode: Option<BlendMode>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
    pub content: Option<LayerContent>,
}

impl LayerPatch {
    fn apply(self, layer: &Layer, max_blur: f32) -> Layer {
        let mut next = layer.clone();
        if let Some(name) = self.name {
            next = next.with_name(name);
        }
        if let Some(opacity) = self.opacity {
            next = next.with_opacity(clamp_opacity(opacity));
        }
        if let Some(mode) = self.blend_mode {
            next = next.with_blend_mode(mode);
        }
        if let Some(visible) = self.visible {
            next = next.with_visible(visible);
        }
        if let Some(locked) = self.locked {
            next = next.with_locked(locked);
        }
        if let Some(content) = self.content {
            next = next.with_content(sanitize_content(content, max_blur));
        }
        next
    }
}

/// Every state transition the editor accepts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SetTool { tool: Tool },
    UpdateBrush {
        #[serde(default)]
        size: Option<f32>,
        #[serde(default)]
        color: Option<Color>,
        #[serde(default)]
        opacity: Option<f32>,
    },
    UpdateText {
        #[serde(default)]
        font: Option<String>,
        #[serde(default)]
        size: Option<f32>,
        #[serde(default)]
        color: Option<Color>,
        #[serde(default)]
        align: Option<TextAlignment>,
    },
    SetAdjustment { adjustment: Adjustment, value: f32 },
    ResetAdjustments,
    UpdateTransform {
        #[serde(default)]
        rotate: Option<i32>,
        #[serde(default)]
        flip_x: Option<bool>,
        #[serde(default)]
        flip_y: Option<bool>,
    },
    /// Rotate relative to the current angle (e.g. ±90 from toolbar buttons).
    RotateBy { degrees: i32 },

    AddLayer { layer: Layer },
    UpdateLayer { index: usize, patch: LayerPatch },
    DeleteLayer { index: usize },
    MoveLayer { from: usize, to: usize },
    SetCurrentLayer { index: usize },
    TranslateLayer { index: usize, dx: f32, dy: f32 },

    BeginStroke {
        point: Point,
        #[serde(default)]
        eraser: bool,
    },
    ExtendStroke { point: Point },
    EndStroke,
    PlaceShape { shape: ShapePayload },
    PlaceText { text: TextPayload },
    SetPreview { layer: Option<Layer> },

    BeginGesture {
        #[serde(default)]
        label: Option<String>,
    },
    CommitGesture,
    CancelGesture,
    Undo,
    Redo,
}

fn sanitize_content(content: LayerContent, max_blur: f32) -> LayerContent {
    match content {
        LayerContent::Adjustment(set) => LayerContent::Adjustment(set.sanitized(max_blur)),
        other => other,
    }
}

pub struct Editor {
    stack: LayerStack,
    history: HistoryManager,
    tool: Tool,
    brush: BrushSettings,
    text: TextSettings,
    adjustments: AdjustmentSet,
    transform: TransformState,
    canvas_size: (u32, u32),
    preview: Option<Layer>,
    images: ImageCache,
    compositor: Compositor,
    settings: EditorSettings,
    /// Snapshot taken when the open gesture began.
    gesture: Option<Snapshot>,
    /// Index of the drawing layer receiving the active stroke.
    stroke_layer: Option<LayerId>,
}

impl Editor {
    pub fn new(settings: EditorSettings) -> Self {
        let compositor = Compositor::with_system_fonts(&settings.font_dirs);
        Self::with_compositor(settings, compositor)
    }

    pub fn with_compositor(settings: EditorSettings, compositor: Compositor) -> Self {
        let history = HistoryManager::new(settings.max_undo_steps)
            .with_memory_limit(Some(settings.max_history_bytes()));
        Self {
            stack: LayerStack::new(),
            history,
            tool: Tool::default(),
            brush: BrushSettings {
                size: settings.brush_size,
                color: settings.brush_color,
                opacity: clamp_opacity(settings.brush_opacity),
            },
            text: TextSettings {
                font: settings.text_font.clone(),
                size: settings.text_size,
                color: settings.text_color,
                align: TextAlignment::Left,
            },
            adjustments: AdjustmentSet::default(),
            transform: TransformState::default(),
            canvas_size: (0, 0),
            preview: None,
            images: ImageCache::new(),
            compositor,
            settings,
            gesture: None,
            stroke_layer: None,
        }
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Start a session on `source`: the stack becomes a single locked base
    /// image layer and history is cleared.
    pub fn load_base(&mut self, source: ImageSource) {
        self.canvas_size = match &source {
            ImageSource::Raster(img) => img.dimensions(),
            _ => (0, 0),
        };
        self.stack = LayerStack::from_layers(vec![Layer::base_image(source)]);
        self.history.clear();
        self.gesture = None;
        self.stroke_layer = None;
        self.preview = None;
        self.images.sync(&self.stack);
        log_info!("Session started ({}x{})", self.canvas_size.0, self.canvas_size.1);
    }

    pub fn open_path(&mut self, path: &Path) {
        self.load_base(ImageSource::Uri(path.display().to_string()));
    }

    /// Install any finished decodes.  Returns how many arrived.
    pub fn poll_decodes(&mut self) -> usize {
        self.images.sync(&self.stack);
        let installed = self.images.poll();
        self.update_canvas_size();
        installed
    }

    /// Block until every requested decode has finished.
    pub fn wait_for_decodes(&mut self) -> usize {
        self.images.sync(&self.stack);
        let installed = self.images.wait();
        self.update_canvas_size();
        installed
    }

    fn update_canvas_size(&mut self) {
        if self.canvas_size != (0, 0) {
            return;
        }
        let base = self
            .stack
            .find(&LayerId::base())
            .or_else(|| self.stack.iter().find(|l| matches!(l.content, LayerContent::Image(_))));
        if let Some(layer) = base
            && let Some(DecodeState::Ready(img)) = self.images.state(&layer.id)
        {
            self.canvas_size = img.dimensions();
            log_info!("Canvas size set to {}x{}", img.width(), img.height());
        }
    }

    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        self.canvas_size = (width, height);
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    pub fn render(&mut self) -> CompositeOutput {
        self.poll_decodes();
        let (w, h) = self.canvas_size;
        let out = self.compositor.composite(
            &self.stack,
            w,
            h,
            &self.adjustments,
            &self.transform,
            &self.images,
            self.preview.as_ref(),
        );
        for failure in &out.failed_layers {
            log_warn!("Render: {}", failure);
        }
        for (id, family) in &out.missing_fonts {
            log_warn!("Render: text layer {} skipped, font '{}' not found", id, family);
        }
        out
    }

    pub fn export(&mut self, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
        let out = self.render();
        io::encode(&out.surface, format, quality)
    }

    pub fn export_to_path(&mut self, path: &Path, format: ExportFormat, quality: u8) -> Result<()> {
        let out = self.render();
        io::export_to_path(&out.surface, path, format, quality)?;
        log_info!("Exported {}x{} {:?} to {}", out.surface.width(), out.surface.height(), format, path.display());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn layers(&self) -> &LayerStack {
        &self.stack
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn brush(&self) -> &BrushSettings {
        &self.brush
    }

    pub fn text_settings(&self) -> &TextSettings {
        &self.text
    }

    pub fn adjustments(&self) -> &AdjustmentSet {
        &self.adjustments
    }

    pub fn transform(&self) -> &TransformState {
        &self.transform
    }

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn preview(&self) -> Option<&Layer> {
        self.preview.as_ref()
    }

    pub fn in_gesture(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn stroke_active(&self) -> bool {
        self.stroke_layer.is_some()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Apply one action.  `Ok(true)` when editor state changed.
    ///
    /// A rejected layer mutation returns `EditorError::InvalidMutation` and
    /// leaves the stack untouched.
    pub fn dispatch(&mut self, action: Action) -> Result<bool> {
        let result = self.apply(action);
        if let Err(e) = &result {
            log_warn!("Action rejected: {}", e);
        }
        result
    }

    fn apply(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::SetTool { tool } => {
                if self.stroke_layer.is_some() {
                    self.end_stroke();
                } else if self.gesture.is_some() {
                    self.cancel_gesture();
                }
                self.preview = None;
                let changed = self.tool != tool;
                self.tool = tool;
                Ok(changed)
            }
            Action::UpdateBrush { size, color, opacity } => {
                let before = self.brush.clone();
                if let Some(size) = size.filter(|s| s.is_finite() && *s > 0.0) {
                    self.brush.size = size;
                }
                if let Some(color) = color {
                    self.brush.color = color;
                }
                if let Some(opacity) = opacity {
                    self.brush.opacity = clamp_opacity(opacity);
                }
                Ok(self.brush != before)
            }
            Action::UpdateText { font, size, color, align } => {
                let before = self.text.clone();
                if let Some(font) = font.filter(|f| !f.trim().is_empty()) {
                    self.text.font = font;
                }
                if let Some(size) = size.filter(|s| s.is_finite() && *s > 0.0) {
                    self.text.size = size;
                }
                if let Some(color) = color {
                    self.text.color = color;
                }
                if let Some(align) = align {
                    self.text.align = align;
                }
                Ok(self.text != before)
            }
            Action::SetAdjustment { adjustment, value } => {
                let before = self.adjustments;
                self.adjustments.set_clamped(adjustment, value, self.settings.max_blur);
                Ok(self.adjustments != before)
            }
            Action::ResetAdjustments => {
                let changed = !self.adjustments.is_identity() || self.transform != TransformState::default();
                self.adjustments = AdjustmentSet::default();
                self.transform = TransformState::default();
                Ok(changed)
            }
            Action::UpdateTransform { rotate, flip_x, flip_y } => {
                let before = self.transform;
                if let Some(rotate) = rotate {
                    self.transform.rotate = rotate;
                }
                if let Some(flip_x) = flip_x {
                    self.transform.flip_x = flip_x;
                }
                if let Some(flip_y) = flip_y {
                    self.transform.flip_y = flip_y;
                }
                Ok(self.transform != before)
            }
            Action::RotateBy { degrees } => {
                self.transform.rotate = self.transform.rotate.wrapping_add(degrees);
                Ok(degrees != 0)
            }

            Action::AddLayer { layer } => {
                let opacity = clamp_opacity(layer.opacity);
                let content = sanitize_content(layer.content.clone(), self.settings.max_blur);
                let layer = layer.with_opacity(opacity).with_content(content);
                self.mutate("Add layer", |stack| {
                    stack.push(layer);
                    Ok(())
                })
            }
            Action::UpdateLayer { index, patch } => {
                let current = self.layer_at(index)?;
                let next = patch.apply(current, self.settings.max_blur);
                if &next == current {
                    return Ok(false);
                }
                self.mutate("Layer properties", |stack| stack.replace(index, next))
            }
            Action::DeleteLayer { index } => {
                self.layer_at(index)?;
                if self.stroke_layer.is_some() {
                    self.end_stroke();
                }
                self.mutate("Delete layer", |stack| stack.remove(index).map(|_| ()))
            }
            Action::MoveLayer { from, to } => {
                self.layer_at(from)?;
                self.layer_at(to)?;
                if from == to {
                    return Ok(false);
                }
                self.mutate("Reorder layers", |stack| stack.move_layer(from, to))
            }
            Action::SetCurrentLayer { index } => {
                let changed = self.stack.current_index() != index;
                self.stack.set_current(index)?;
                Ok(changed)
            }
            Action::TranslateLayer { index, dx, dy } => {
                let layer = self.layer_at(index)?;
                if layer.locked {
                    log_info!("Layer {} is locked; move ignored", layer.id);
                    return Ok(false);
                }
                if dx == 0.0 && dy == 0.0 {
                    return Ok(false);
                }
                let Some(moved) = layer.translated(dx, dy) else {
                    return Ok(false);
                };
                self.mutate("Move layer", |stack| stack.replace(index, moved))
            }

            Action::BeginStroke { point, eraser } => Ok(self.begin_stroke(point, eraser)),
            Action::ExtendStroke { point } => Ok(self.extend_stroke(point)),
            Action::EndStroke => Ok(self.end_stroke()),
            Action::PlaceShape { shape } => {
                self.preview = None;
                self.mutate("Shape", |stack| {
                    stack.push(Layer::shape(shape));
                    Ok(())
                })
            }
            Action::PlaceText { text } => {
                if text.content.trim().is_empty() {
                    return Ok(false);
                }
                self.mutate("Text", |stack| {
                    stack.push(Layer::text(text));
                    Ok(())
                })
            }
            Action::SetPreview { layer } => {
                let changed = self.preview != layer;
                self.preview = layer;
                Ok(changed)
            }

            Action::BeginGesture { label } => {
                if self.gesture.is_some() {
                    return Ok(false);
                }
                let label = label.unwrap_or_else(|| "Edit".to_string());
                self.gesture = Some(Snapshot::capture(&self.stack, label));
                Ok(false)
            }
            Action::CommitGesture => Ok(self.commit_gesture()),
            Action::CancelGesture => Ok(self.cancel_gesture()),
            Action::Undo => {
                self.finish_open_gesture();
                Ok(self.history.undo(&mut self.stack))
            }
            Action::Redo => {
                self.finish_open_gesture();
                Ok(self.history.redo(&mut self.stack))
            }
        }
    }

    fn layer_at(&self, index: usize) -> Result<&Layer> {
        self.stack
            .get(index)
            .ok_or(EditorError::InvalidMutation { index, len: self.stack.len() })
    }

    /// Run a discrete stack edit, recording a snapshot unless a gesture is open.
    fn mutate<F>(&mut self, description: &str, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut LayerStack) -> Result<()>,
    {
        let before = self.stack.clone();
        match edit(&mut self.stack) {
            Ok(()) => {
                if self.gesture.is_none() {
                    self.history.push(Snapshot::new(before, description));
                }
                Ok(true)
            }
            Err(e) => {
                self.stack = before;
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Gestures
    // ------------------------------------------------------------------

    fn commit_gesture(&mut self) -> bool {
        self.stroke_layer = None;
        let Some(snapshot) = self.gesture.take() else {
            return false;
        };
        if snapshot.stack() == &self.stack {
            return false;
        }
        self.history.push(snapshot);
        true
    }

    fn cancel_gesture(&mut self) -> bool {
        self.stroke_layer = None;
        self.preview = None;
        let Some(snapshot) = self.gesture.take() else {
            return false;
        };
        let changed = snapshot.stack() != &self.stack;
        self.stack = snapshot.into_stack();
        changed
    }

    fn finish_open_gesture(&mut self) {
        if self.gesture.is_some() || self.stroke_layer.is_some() {
            self.commit_gesture();
        }
        self.preview = None;
    }

    /// Start a stroke on the current drawing layer, or on a new one when the
    /// current layer is not an unlocked drawing layer.
    fn begin_stroke(&mut self, point: Point, eraser: bool) -> bool {
        if self.stroke_layer.is_some() {
            self.end_stroke();
        }
        if self.gesture.is_none() {
            let label = if eraser { "Eraser stroke" } else { "Brush stroke" };
            self.gesture = Some(Snapshot::capture(&self.stack, label));
        }

        let color = if eraser { self.settings.background_color } else { self.brush.color };
        let stroke = Stroke::new(point, color, self.brush.size);

        let index = self.stack.current_index();
        let reusable = self
            .stack
            .current()
            .filter(|l| !l.locked)
            .and_then(|l| match &l.content {
                LayerContent::Drawing(d) => Some((l.clone(), d.clone())),
                _ => None,
            });

        match reusable {
            Some((layer, mut drawing)) => {
                drawing.strokes.push(stroke);
                let id = layer.id.clone();
                let next = layer.with_content(LayerContent::Drawing(drawing));
                if self.stack.replace(index, next).is_err() {
                    return false;
                }
                self.stroke_layer = Some(id);
            }
            None => {
                let layer = Layer::drawing(DrawingPayload { strokes: vec![stroke] })
                    .with_opacity(self.brush.opacity);
                self.stroke_layer = Some(layer.id.clone());
                self.stack.push(layer);
            }
        }
        true
    }

    /// Append to the stroke's own layer, wherever reordering has put it.
    fn extend_stroke(&mut self, point: Point) -> bool {
        let Some(id) = &self.stroke_layer else {
            return false;
        };
        let Some(index) = self.stack.position(id) else {
            self.stroke_layer = None;
            return false;
        };
        let Some(layer) = self.stack.get(index) else {
            return false;
        };
        let LayerContent::Drawing(drawing) = &layer.content else {
            return false;
        };
        let mut drawing = drawing.clone();
        let Some(stroke) = drawing.strokes.last_mut() else {
            return false;
        };
        if stroke.points.last() == Some(&point) {
            return false;
        }
        stroke.points.push(point);
        let next = layer.clone().with_content(LayerContent::Drawing(drawing));
        self.stack.replace(index, next).is_ok()
    }

    fn end_stroke(&mut self) -> bool {
        if self.stroke_layer.is_none() {
            return false;
        }
        self.commit_gesture()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::layer::ShapeKind;
    use crate::text::FontLibrary;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn editor() -> Editor {
        let compositor = Compositor::new(Arc::new(FontLibrary::new(vec![])));
        let mut ed = Editor::with_compositor(EditorSettings::default(), compositor);
        ed.load_base(ImageSource::raster(RgbaImage::from_pixel(20, 20, Rgba([200, 200, 200, 255]))));
        ed
    }

    fn rect(x: f32) -> ShapePayload {
        ShapePayload {
            kind: ShapeKind::Rectangle,
            x,
            y: 2.0,
            width: 6.0,
            height: 6.0,
            color: Color::BLACK,
            stroke_width: 1.0,
        }
    }

    #[test]
    fn base_layer_is_locked_and_history_starts_empty() {
        let ed = editor();
        assert_eq!(ed.layers().len(), 1);
        let base = ed.layers().get(0).unwrap();
        assert_eq!(base.id.as_str(), "base-image");
        assert!(base.locked);
        assert!(!ed.can_undo() && !ed.can_redo());
        assert_eq!(ed.canvas_size(), (20, 20));
    }

    #[test]
    fn stroke_on_locked_base_creates_drawing_layer() {
        let mut ed = editor();
        ed.dispatch(Action::UpdateBrush { size: Some(3.0), color: None, opacity: Some(0.4) }).unwrap();
        ed.dispatch(Action::BeginStroke { point: Point::new(1.0, 1.0), eraser: false }).unwrap();
        ed.dispatch(Action::ExtendStroke { point: Point::new(5.0, 5.0) }).unwrap();
        ed.dispatch(Action::EndStroke).unwrap();

        assert_eq!(ed.layers().len(), 2);
        assert_eq!(ed.layers().current_index(), 1);
        let layer = ed.layers().current().unwrap();
        assert_eq!(layer.opacity, 0.4);
        match &layer.content {
            LayerContent::Drawing(d) => {
                assert_eq!(d.strokes.len(), 1);
                assert_eq!(d.strokes[0].points.len(), 2);
                assert_eq!(d.strokes[0].width, 3.0);
                assert_eq!(d.strokes[0].color, Color::BLACK);
            }
            other => panic!("expected drawing, got {other:?}"),
        }
        assert_eq!(ed.history().undo_count(), 1);
    }

    #[test]
    fn second_stroke_reuses_current_drawing_layer() {
        let mut ed = editor();
        for _ in 0..2 {
            ed.dispatch(Action::BeginStroke { point: Point::new(1.0, 1.0), eraser: false }).unwrap();
            ed.dispatch(Action::EndStroke).unwrap();
        }
        ed.dispatch(Action::BeginStroke { point: Point::new(2.0, 2.0), eraser: true }).unwrap();
        ed.dispatch(Action::EndStroke).unwrap();

        assert_eq!(ed.layers().len(), 2);
        match &ed.layers().current().unwrap().content {
            LayerContent::Drawing(d) => {
                assert_eq!(d.strokes.len(), 3);
                assert_eq!(d.strokes[2].color, Color::WHITE);
            }
            other => panic!("expected drawing, got {other:?}"),
        }
        assert_eq!(ed.history().undo_count(), 3);
    }

    #[test]
    fn opacity_is_clamped_at_the_boundary() {
        let mut ed = editor();
        ed.dispatch(Action::PlaceShape { shape: rect(1.0) }).unwrap();
        let patch = LayerPatch { opacity: Some(4.0), ..Default::default() };
        ed.dispatch(Action::UpdateLayer { index: 1, patch }).unwrap();
        assert_eq!(ed.layers().get(1).unwrap().opacity, 1.0);

        let patch = LayerPatch { opacity: Some(-2.0), ..Default::default() };
        ed.dispatch(Action::UpdateLayer { index: 1, patch }).unwrap();
        assert_eq!(ed.layers().get(1).unwrap().opacity, 0.0);

        let added = Layer::shape(rect(3.0)).with_opacity(9.0);
        ed.dispatch(Action::AddLayer { layer: added }).unwrap();
        assert_eq!(ed.layers().get(2).unwrap().opacity, 1.0);
    }

    #[test]
    fn invalid_index_is_rejected_without_history() {
        let mut ed = editor();
        let before = ed.layers().clone();
        let err = ed
            .dispatch(Action::UpdateLayer { index: 7, patch: LayerPatch::default() })
            .unwrap_err();
        assert!(matches!(err, EditorError::InvalidMutation { index: 7, len: 1 }));
        assert!(ed.dispatch(Action::DeleteLayer { index: 3 }).is_err());
        assert!(ed.dispatch(Action::MoveLayer { from: 0, to: 4 }).is_err());
        assert_eq!(ed.layers(), &before);
        assert!(!ed.can_undo());
    }

    #[test]
    fn gesture_groups_edits_into_one_entry() {
        let mut ed = editor();
        ed.dispatch(Action::PlaceShape { shape: rect(1.0) }).unwrap();
        ed.dispatch(Action::BeginGesture { label: Some("Opacity".into()) }).unwrap();
        for v in [0.9, 0.7, 0.5] {
            let patch = LayerPatch { opacity: Some(v), ..Default::default() };
            ed.dispatch(Action::UpdateLayer { index: 1, patch }).unwrap();
        }
        ed.dispatch(Action::CommitGesture).unwrap();
        assert_eq!(ed.history().undo_count(), 2);

        ed.dispatch(Action::Undo).unwrap();
        assert_eq!(ed.layers().get(1).unwrap().opacity, 1.0);
    }

    #[test]
    fn cancelled_gesture_restores_and_records_nothing() {
        let mut ed = editor();
        let before = ed.layers().clone();
        ed.dispatch(Action::BeginGesture { label: None }).unwrap();
        ed.dispatch(Action::PlaceShape { shape: rect(1.0) }).unwrap();
        assert_eq!(ed.layers().len(), 2);
        assert!(ed.dispatch(Action::CancelGesture).unwrap());
        assert_eq!(ed.layers(), &before);
        assert!(!ed.can_undo());
    }

    #[test]
    fn empty_gesture_commit_records_nothing() {
        let mut ed = editor();
        ed.dispatch(Action::BeginGesture { label: None }).unwrap();
        assert!(!ed.dispatch(Action::CommitGesture).unwrap());
        assert!(!ed.can_undo());
    }

    #[test]
    fn open_stroke_follows_its_layer_through_a_reorder() {
        let mut ed = editor();
        let dot = |x: f32| DrawingPayload { strokes: vec![Stroke::new(Point::new(x, 1.0), Color::BLACK, 2.0)] };
        let a = Layer::drawing(dot(1.0));
        let b = Layer::drawing(dot(9.0));
        let (a_id, b_id) = (a.id.clone(), b.id.clone());
        ed.dispatch(Action::AddLayer { layer: a }).unwrap();
        ed.dispatch(Action::AddLayer { layer: b }).unwrap();
        assert_eq!(ed.layers().current_index(), 2);

        ed.dispatch(Action::BeginStroke { point: Point::new(3.0, 3.0), eraser: false }).unwrap();
        ed.dispatch(Action::MoveLayer { from: 2, to: 1 }).unwrap();
        assert!(ed.stroke_active());
        ed.dispatch(Action::ExtendStroke { point: Point::new(8.0, 8.0) }).unwrap();
        ed.dispatch(Action::EndStroke).unwrap();

        let strokes = |id: &LayerId| match &ed.layers().find(id).unwrap().content {
            LayerContent::Drawing(d) => d.strokes.iter().map(|s| s.points.len()).collect::<Vec<_>>(),
            other => panic!("expected drawing, got {other:?}"),
        };
        assert_eq!(strokes(&a_id), vec![1]);
        assert_eq!(strokes(&b_id), vec![1, 2]);
        assert_eq!(ed.layers().position(&b_id), Some(1));
    }

    #[test]
    fn add_layer_with_shape_content_survives_json() {
        let action = Action::AddLayer { layer: Layer::shape(rect(4.0)).with_opacity(0.75) };
        let json = serde_json::to_string(&action).unwrap();
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);

        let mut ed = editor();
        ed.dispatch(back).unwrap();
        match &ed.layers().get(1).unwrap().content {
            LayerContent::Shape(shape) => assert_eq!(shape.kind, ShapeKind::Rectangle),
            other => panic!("expected shape, got {other:?}"),
        }
    }

    #[test]
    fn translate_moves_unlocked_layers_only() {
        let mut ed = editor();
        ed.dispatch(Action::PlaceShape { shape: rect(1.0) }).unwrap();
        assert!(ed.dispatch(Action::TranslateLayer { index: 1, dx: 2.0, dy: 3.0 }).unwrap());
        match &ed.layers().get(1).unwrap().content {
            LayerContent::Shape(s) => assert_eq!((s.x, s.y), (3.0, 5.0)),
            other => panic!("expected shape, got {other:?}"),
        }
        assert!(!ed.dispatch(Action::TranslateLayer { index: 0, dx: 2.0, dy: 3.0 }).unwrap());
    }

    #[test]
    fn switching_tools_commits_an_open_stroke() {
        let mut ed = editor();
        ed.dispatch(Action::BeginStroke { point: Point::new(1.0, 1.0), eraser: false }).unwrap();
        ed.dispatch(Action::SetTool { tool: Tool::Rectangle }).unwrap();
        assert!(!ed.stroke_active());
        assert!(!ed.in_gesture());
        assert_eq!(ed.history().undo_count(), 1);
        assert_eq!(ed.tool(), Tool::Rectangle);
    }

    #[test]
    fn adjustments_clamp_to_configured_blur_ceiling() {
        let settings = EditorSettings { max_blur: 12.0, ..Default::default() };
        let compositor = Compositor::new(Arc::new(FontLibrary::new(vec![])));
        let mut ed = Editor::with_compositor(settings, compositor);
        ed.dispatch(Action::SetAdjustment { adjustment: Adjustment::Blur, value: 40.0 }).unwrap();
        assert_eq!(ed.adjustments().blur, 12.0);
        ed.dispatch(Action::RotateBy { degrees: -90 }).unwrap();
        assert_eq!(ed.transform().display_rotation(), 270);
        assert!(ed.dispatch(Action::ResetAdjustments).unwrap());
        assert!(ed.adjustments().is_identity());
    }

    #[test]
    fn actions_deserialize_from_json() {
        let json = r##"[
            {"type": "set_tool", "tool": "circle"},
            {"type": "update_brush", "color": "#ff0000", "size": 8},
            {"type": "set_adjustment", "adjustment": "hue_rotate", "value": 90},
            {"type": "place_shape", "shape": {"kind": "circle", "x": 1, "y": 1, "width": 10,
                "height": 10, "color": "#00ff00", "stroke_width": 2}},
            {"type": "update_layer", "index": 1, "patch": {"blend_mode": "screen"}},
            {"type": "undo"}
        ]"##;
        let actions: Vec<Action> = serde_json::from_str(json).unwrap();
        assert_eq!(actions.len(), 6);
        let mut ed = editor();
        for action in actions {
            ed.dispatch(action).unwrap();
        }
        assert_eq!(ed.tool(), Tool::Circle);
        assert_eq!(ed.brush().color, Color::rgb(255, 0, 0));
        assert_eq!(ed.adjustments().hue_rotate, 90.0);
        assert_eq!(ed.layers().get(1).unwrap().blend_mode, BlendMode::Normal);
        assert!(ed.can_redo());
    }
}
