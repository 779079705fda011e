//! EditFE — layered image editing core.
//!
//! The crate owns the layer model, the compositor, the adjustment pipeline,
//! pointer/keyboard interaction and snapshot-based undo/redo.  Hosts drive it
//! exclusively through [`Editor::dispatch`] and the [`Controller`] and read
//! back the composited raster with [`Editor::render`].

#![allow(clippy::too_many_arguments)]

pub mod logger;

pub mod adjust;
pub mod cli;
pub mod compositor;
pub mod controller;
pub mod decode;
pub mod editor;
pub mod error;
pub mod history;
pub mod io;
pub mod layer;
pub mod settings;
pub mod shapes;
pub mod text;

pub use adjust::{Adjustment, AdjustmentSet, TransformState};
pub use compositor::{CompositeOutput, Compositor};
pub use controller::{Controller, Key, KeyEvent, Tool, Viewport};
pub use editor::{Action, BrushSettings, Editor, LayerPatch, TextSettings};
pub use error::{EditorError, Result};
pub use history::HistoryManager;
pub use layer::{
    BlendMode, Color, DrawingPayload, ImageSource, Layer, LayerContent, LayerId, LayerKind,
    LayerStack, Point, ShapeKind, ShapePayload, Stroke, TextAlignment, TextPayload,
};
pub use settings::EditorSettings;
