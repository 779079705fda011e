// ============================================================================
// INTERACTION CONTROLLER — pointer and keyboard input turned into Actions
// ============================================================================

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::editor::{Action, Editor};
use crate::error::Result;
use crate::layer::{Layer, Point, ShapeKind, ShapePayload, TextPayload};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Move,
    Brush,
    Eraser,
    Rectangle,
    Circle,
    Line,
    Text,
    /// Selectable, no pointer effect.
    Clone,
    /// Selectable, no pointer effect.
    Blur,
}

impl Tool {
    pub fn all() -> &'static [Tool] {
        &[
            Tool::Move,
            Tool::Brush,
            Tool::Eraser,
            Tool::Rectangle,
            Tool::Circle,
            Tool::Line,
            Tool::Text,
            Tool::Clone,
            Tool::Blur,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Tool::Move => "Move",
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Rectangle => "Rectangle",
            Tool::Circle => "Circle",
            Tool::Line => "Line",
            Tool::Text => "Text",
            Tool::Clone => "Clone",
            Tool::Blur => "Blur",
        }
    }

    pub fn shape_kind(&self) -> Option<ShapeKind> {
        match self {
            Tool::Rectangle => Some(ShapeKind::Rectangle),
            Tool::Circle => Some(ShapeKind::Circle),
            Tool::Line => Some(ShapeKind::Line),
            _ => None,
        }
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Tool::all()
            .iter()
            .copied()
            .find(|t| t.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown tool '{s}'"))
    }
}

/// Where the canvas is drawn on screen and at what scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub display_w: f32,
    pub display_h: f32,
    pub canvas_w: u32,
    pub canvas_h: u32,
}

impl Viewport {
    /// Canvas shown 1:1 at the screen origin.
    pub fn identity(canvas_w: u32, canvas_h: u32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            display_w: canvas_w as f32,
            display_h: canvas_h as f32,
            canvas_w,
            canvas_h,
        }
    }

    /// Map a screen position to sub-pixel canvas coordinates.  Points outside
    /// the displayed rectangle map outside the canvas; they are not clamped.
    pub fn to_canvas(&self, screen_x: f32, screen_y: f32) -> Point {
        let sx = if self.display_w > 0.0 { self.canvas_w as f32 / self.display_w } else { 1.0 };
        let sy = if self.display_h > 0.0 { self.canvas_h as f32 / self.display_h } else { 1.0 };
        Point::new((screen_x - self.left) * sx, (screen_y - self.top) * sy)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Z,
    Y,
    Escape,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub shift: bool,
}

impl KeyEvent {
    pub fn plain(key: Key) -> Self {
        Self { key, ctrl: false, shift: false }
    }

    pub fn ctrl(key: Key) -> Self {
        Self { key, ctrl: true, shift: false }
    }

    pub fn ctrl_shift(key: Key) -> Self {
        Self { key, ctrl: true, shift: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Gesture {
    Idle,
    Stroke,
    ShapeDrag { kind: ShapeKind, start: Point },
    Move { last: Point },
    TextEntry,
}

/// Pointer state machine sitting between a host's input events and
/// [`Editor::dispatch`].
pub struct Controller {
    viewport: Viewport,
    gesture: Gesture,
    pending_text_anchor: Option<Point>,
}

impl Controller {
    pub fn new(viewport: Viewport) -> Self {
        Self { viewport, gesture: Gesture::Idle, pending_text_anchor: None }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    /// Canvas position of an open text entry.
    pub fn pending_text_anchor(&self) -> Option<Point> {
        self.pending_text_anchor
    }

    pub fn is_idle(&self) -> bool {
        self.gesture == Gesture::Idle
    }

    pub fn set_tool(&mut self, editor: &mut Editor, tool: Tool) -> Result<bool> {
        self.gesture = Gesture::Idle;
        self.pending_text_anchor = None;
        editor.dispatch(Action::SetTool { tool })
    }

    pub fn pointer_down(&mut self, editor: &mut Editor, screen_x: f32, screen_y: f32) -> Result<bool> {
        if !matches!(self.gesture, Gesture::Idle | Gesture::TextEntry) {
            return Ok(false);
        }
        let point = self.viewport.to_canvas(screen_x, screen_y);
        let tool = editor.tool();

        if let Some(kind) = tool.shape_kind() {
            self.gesture = Gesture::ShapeDrag { kind, start: point };
            return Ok(false);
        }

        match tool {
            Tool::Brush | Tool::Eraser => {
                self.gesture = Gesture::Stroke;
                editor.dispatch(Action::BeginStroke { point, eraser: tool == Tool::Eraser })
            }
            Tool::Text => {
                self.gesture = Gesture::TextEntry;
                self.pending_text_anchor = Some(point);
                Ok(false)
            }
            Tool::Move => {
                self.gesture = Gesture::Move { last: point };
                editor.dispatch(Action::BeginGesture { label: Some("Move layer".to_string()) })
            }
            _ => Ok(false),
        }
    }

    pub fn pointer_move(&mut self, editor: &mut Editor, screen_x: f32, screen_y: f32) -> Result<bool> {
        let point = self.viewport.to_canvas(screen_x, screen_y);
        match self.gesture {
            Gesture::Stroke => editor.dispatch(Action::ExtendStroke { point }),
            Gesture::ShapeDrag { kind, start } => {
                let brush = editor.brush();
                let layer = ShapePayload::from_drag(kind, start, point, brush.color, brush.size)
                    .map(Layer::shape);
                editor.dispatch(Action::SetPreview { layer })
            }
            Gesture::Move { last } => {
                self.gesture = Gesture::Move { last: point };
                translate_current(editor, point.x - last.x, point.y - last.y)
            }
            Gesture::Idle | Gesture::TextEntry => Ok(false),
        }
    }

    pub fn pointer_up(&mut self, editor: &mut Editor, screen_x: f32, screen_y: f32) -> Result<bool> {
        let point = self.viewport.to_canvas(screen_x, screen_y);
        match self.gesture {
            Gesture::Stroke => {
                self.gesture = Gesture::Idle;
                editor.dispatch(Action::ExtendStroke { point })?;
                editor.dispatch(Action::EndStroke)
            }
            Gesture::ShapeDrag { kind, start } => {
                self.gesture = Gesture::Idle;
                editor.dispatch(Action::SetPreview { layer: None })?;
                let brush = editor.brush();
                match ShapePayload::from_drag(kind, start, point, brush.color, brush.size) {
                    Some(shape) => editor.dispatch(Action::PlaceShape { shape }),
                    None => Ok(false),
                }
            }
            Gesture::Move { last } => {
                self.gesture = Gesture::Idle;
                let moved = translate_current(editor, point.x - last.x, point.y - last.y);
                let committed = editor.dispatch(Action::CommitGesture)?;
                Ok(moved? || committed)
            }
            Gesture::Idle | Gesture::TextEntry => Ok(false),
        }
    }

    /// The pointer left the canvas.  A stroke or move drag is committed as it
    /// stands; a shape drag is abandoned.
    pub fn pointer_leave(&mut self, editor: &mut Editor) -> Result<bool> {
        match self.gesture {
            Gesture::Stroke => {
                self.gesture = Gesture::Idle;
                editor.dispatch(Action::EndStroke)
            }
            Gesture::ShapeDrag { .. } => {
                self.gesture = Gesture::Idle;
                editor.dispatch(Action::SetPreview { layer: None })
            }
            Gesture::Move { .. } => {
                self.gesture = Gesture::Idle;
                editor.dispatch(Action::CommitGesture)
            }
            Gesture::Idle | Gesture::TextEntry => Ok(false),
        }
    }

    /// Place `content` at the pending anchor with the current text settings.
    /// Blank content closes the entry without adding a layer.
    pub fn submit_text(&mut self, editor: &mut Editor, content: &str) -> Result<bool> {
        let Some(anchor) = self.pending_text_anchor.take() else {
            return Ok(false);
        };
        if self.gesture == Gesture::TextEntry {
            self.gesture = Gesture::Idle;
        }
        if content.trim().is_empty() {
            return Ok(false);
        }
        let settings = editor.text_settings();
        let text = TextPayload {
            content: content.to_string(),
            x: anchor.x,
            y: anchor.y,
            font: settings.font.clone(),
            size: settings.size,
            color: settings.color,
            align: settings.align,
            rotation: 0.0,
        };
        editor.dispatch(Action::PlaceText { text })
    }

    pub fn cancel_text(&mut self) {
        self.pending_text_anchor = None;
        if self.gesture == Gesture::TextEntry {
            self.gesture = Gesture::Idle;
        }
    }

    pub fn key_down(&mut self, editor: &mut Editor, event: KeyEvent) -> Result<bool> {
        match (event.key, event.ctrl, event.shift) {
            (Key::Z, true, false) => {
                self.abandon_pointer_state();
                editor.dispatch(Action::Undo)
            }
            (Key::Z, true, true) | (Key::Y, true, _) => {
                self.abandon_pointer_state();
                editor.dispatch(Action::Redo)
            }
            (Key::Escape, _, _) => self.cancel(editor),
            _ => Ok(false),
        }
    }

    /// Abort whatever is in progress, restoring the stack where needed.
    pub fn cancel(&mut self, editor: &mut Editor) -> Result<bool> {
        let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
        match gesture {
            Gesture::Stroke | Gesture::Move { .. } => editor.dispatch(Action::CancelGesture),
            Gesture::ShapeDrag { .. } => editor.dispatch(Action::SetPreview { layer: None }),
            Gesture::TextEntry => {
                let had_entry = self.pending_text_anchor.take().is_some();
                Ok(had_entry)
            }
            Gesture::Idle => Ok(false),
        }
    }

    /// Undo/redo commit the editor's open gesture; drop the matching local state.
    fn abandon_pointer_state(&mut self) {
        self.gesture = Gesture::Idle;
        self.pending_text_anchor = None;
    }
}

fn translate_current(editor: &mut Editor, dx: f32, dy: f32) -> Result<bool> {
    if editor.layers().is_empty() {
        return Ok(false);
    }
    let index = editor.layers().current_index();
    editor.dispatch(Action::TranslateLayer { index, dx, dy })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Compositor;
    use crate::layer::{ImageSource, LayerContent, TextAlignment};
    use crate::settings::EditorSettings;
    use crate::text::FontLibrary;
    use image::{Rgba, RgbaImage};
    use std::sync::Arc;

    fn setup() -> (Editor, Controller) {
        let compositor = Compositor::new(Arc::new(FontLibrary::new(vec![])));
        let mut editor = Editor::with_compositor(EditorSettings::default(), compositor);
        editor.load_base(ImageSource::raster(RgbaImage::from_pixel(40, 40, Rgba([255, 255, 255, 255]))));
        (editor, Controller::new(Viewport::identity(40, 40)))
    }

    #[test]
    fn viewport_maps_display_rect_to_canvas() {
        let vp = Viewport {
            left: 10.0,
            top: 20.0,
            display_w: 50.0,
            display_h: 50.0,
            canvas_w: 100,
            canvas_h: 100,
        };
        assert_eq!(vp.to_canvas(35.0, 45.0), Point::new(50.0, 50.0));
        assert_eq!(vp.to_canvas(10.0, 20.0), Point::new(0.0, 0.0));
    }

    #[test]
    fn tool_names_parse_case_insensitively() {
        assert_eq!("eraser".parse::<Tool>(), Ok(Tool::Eraser));
        assert_eq!(" Circle ".parse::<Tool>(), Ok(Tool::Circle));
        assert!("lasso".parse::<Tool>().is_err());
    }

    #[test]
    fn sessions_start_on_the_move_tool() {
        let (mut editor, mut ctl) = setup();
        assert_eq!(editor.tool(), Tool::Move);
        // Nothing to move: only the locked base exists.
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 15.0, 15.0).unwrap();
        ctl.pointer_up(&mut editor, 15.0, 15.0).unwrap();
        assert_eq!(editor.layers().len(), 1);
        assert!(!editor.can_undo());
    }

    #[test]
    fn brush_drag_makes_one_stroke_and_one_history_entry() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Brush).unwrap();
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 10.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 15.0, 8.0).unwrap();
        ctl.pointer_up(&mut editor, 20.0, 8.0).unwrap();

        assert_eq!(editor.layers().len(), 2);
        match &editor.layers().current().unwrap().content {
            LayerContent::Drawing(d) => assert_eq!(d.strokes[0].points.len(), 4),
            other => panic!("expected drawing, got {other:?}"),
        }
        assert_eq!(editor.history().undo_count(), 1);
        assert!(ctl.is_idle());
    }

    #[test]
    fn shape_drag_previews_then_places_on_release() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Rectangle).unwrap();
        ctl.pointer_down(&mut editor, 20.0, 20.0).unwrap();
        ctl.pointer_move(&mut editor, 12.0, 25.0).unwrap();
        assert!(editor.preview().is_some());
        assert_eq!(editor.layers().len(), 1);

        ctl.pointer_up(&mut editor, 10.0, 30.0).unwrap();
        assert!(editor.preview().is_none());
        match &editor.layers().current().unwrap().content {
            LayerContent::Shape(s) => {
                assert_eq!(s.kind, ShapeKind::Rectangle);
                assert_eq!((s.x, s.y, s.width, s.height), (10.0, 20.0, 10.0, 10.0));
                assert_eq!(s.stroke_width, editor.brush().size);
            }
            other => panic!("expected shape, got {other:?}"),
        }
    }

    #[test]
    fn zero_size_drag_and_leave_place_nothing() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Circle).unwrap();
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_up(&mut editor, 5.0, 5.0).unwrap();

        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 15.0, 15.0).unwrap();
        ctl.pointer_leave(&mut editor).unwrap();

        assert_eq!(editor.layers().len(), 1);
        assert!(editor.preview().is_none());
        assert!(!editor.can_undo());
    }

    #[test]
    fn text_entry_places_layer_with_current_settings() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Text).unwrap();
        editor
            .dispatch(Action::UpdateText {
                font: Some("Mono".into()),
                size: Some(18.0),
                color: None,
                align: Some(TextAlignment::Center),
            })
            .unwrap();
        ctl.pointer_down(&mut editor, 12.0, 14.0).unwrap();
        assert_eq!(ctl.pending_text_anchor(), Some(Point::new(12.0, 14.0)));

        assert!(ctl.submit_text(&mut editor, "Hello").unwrap());
        match &editor.layers().current().unwrap().content {
            LayerContent::Text(t) => {
                assert_eq!(t.content, "Hello");
                assert_eq!((t.x, t.y), (12.0, 14.0));
                assert_eq!(t.font, "Mono");
                assert_eq!(t.size, 18.0);
                assert_eq!(t.align, TextAlignment::Center);
            }
            other => panic!("expected text, got {other:?}"),
        }
        assert!(ctl.pending_text_anchor().is_none());
    }

    #[test]
    fn empty_or_cancelled_text_adds_nothing() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Text).unwrap();
        ctl.pointer_down(&mut editor, 1.0, 1.0).unwrap();
        assert!(!ctl.submit_text(&mut editor, "   ").unwrap());

        ctl.pointer_down(&mut editor, 1.0, 1.0).unwrap();
        ctl.key_down(&mut editor, KeyEvent::plain(Key::Escape)).unwrap();
        assert!(!ctl.submit_text(&mut editor, "late").unwrap());
        assert_eq!(editor.layers().len(), 1);
    }

    #[test]
    fn move_drag_is_one_history_entry() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Line).unwrap();
        ctl.pointer_down(&mut editor, 0.0, 0.0).unwrap();
        ctl.pointer_up(&mut editor, 10.0, 10.0).unwrap();

        ctl.set_tool(&mut editor, Tool::Move).unwrap();
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 7.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 9.0, 6.0).unwrap();
        ctl.pointer_up(&mut editor, 10.0, 8.0).unwrap();

        match &editor.layers().current().unwrap().content {
            LayerContent::Shape(s) => assert_eq!((s.x, s.y), (5.0, 3.0)),
            other => panic!("expected shape, got {other:?}"),
        }
        assert_eq!(editor.history().undo_count(), 2);
        ctl.key_down(&mut editor, KeyEvent::ctrl(Key::Z)).unwrap();
        match &editor.layers().current().unwrap().content {
            LayerContent::Shape(s) => assert_eq!((s.x, s.y), (0.0, 0.0)),
            other => panic!("expected shape, got {other:?}"),
        }
    }

    #[test]
    fn escape_cancels_an_open_stroke() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Brush).unwrap();
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_move(&mut editor, 9.0, 9.0).unwrap();
        ctl.key_down(&mut editor, KeyEvent::plain(Key::Escape)).unwrap();
        assert_eq!(editor.layers().len(), 1);
        assert!(!editor.can_undo());
    }

    #[test]
    fn keyboard_undo_and_redo() {
        let (mut editor, mut ctl) = setup();
        ctl.set_tool(&mut editor, Tool::Brush).unwrap();
        ctl.pointer_down(&mut editor, 5.0, 5.0).unwrap();
        ctl.pointer_up(&mut editor, 6.0, 6.0).unwrap();

        assert!(ctl.key_down(&mut editor, KeyEvent::ctrl(Key::Z)).unwrap());
        assert_eq!(editor.layers().len(), 1);
        assert!(ctl.key_down(&mut editor, KeyEvent::ctrl_shift(Key::Z)).unwrap());
        assert_eq!(editor.layers().len(), 2);
        assert!(ctl.key_down(&mut editor, KeyEvent::ctrl(Key::Z)).unwrap());
        assert!(ctl.key_down(&mut editor, KeyEvent::ctrl(Key::Y)).unwrap());
        assert_eq!(editor.layers().len(), 2);
        assert!(!ctl.key_down(&mut editor, KeyEvent::plain(Key::Z)).unwrap());
    }

    #[test]
    fn clone_and_blur_are_inert() {
        let (mut editor, mut ctl) = setup();
        for tool in [Tool::Clone, Tool::Blur] {
            ctl.set_tool(&mut editor, tool).unwrap();
            ctl.pointer_down(&mut editor, 1.0, 1.0).unwrap();
            ctl.pointer_move(&mut editor, 9.0, 9.0).unwrap();
            ctl.pointer_up(&mut editor, 9.0, 9.0).unwrap();
        }
        assert_eq!(editor.layers().len(), 1);
        assert!(!editor.can_undo());
    }
}
