// ============================================================================
// COMPOSITOR — renders the layer stack bottom-to-top onto one RGBA surface
// ============================================================================
//
// Every visible layer is rendered into its own canvas-sized buffer, then
// blended onto the surface with its opacity and blend mode.  Layers that
// cannot be drawn this pass (decode failed, still decoding, font missing)
// are skipped and reported in `CompositeOutput`; the pass always completes.
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::adjust::{self, AdjustmentSet, TransformState};
use crate::decode::{DecodeState, ImageCache};
use crate::error::EditorError;
use crate::layer::{BlendMode, ImageSource, Layer, LayerContent, LayerId, LayerStack};
use crate::shapes;
use crate::text::{self, FontLibrary, FontProvider};

/// Result of one compositing pass.
#[derive(Debug)]
pub struct CompositeOutput {
    pub surface: RgbaImage,
    /// Image layers whose payload failed to decode (`EditorError::Decode`).
    pub failed_layers: Vec<EditorError>,
    /// Image layers still decoding.
    pub pending_layers: Vec<LayerId>,
    /// Text layers skipped because their font family could not be resolved.
    pub missing_fonts: Vec<(LayerId, String)>,
}

impl CompositeOutput {
    /// True when every visible layer made it onto the surface.
    pub fn is_complete(&self) -> bool {
        self.failed_layers.is_empty() && self.pending_layers.is_empty() && self.missing_fonts.is_empty()
    }
}

/// Memoised adjustment result for one image layer.
struct AdjustedImage {
    source: Arc<RgbaImage>,
    adjustments: AdjustmentSet,
    transform: TransformState,
    output: Arc<RgbaImage>,
}

pub struct Compositor {
    fonts: Arc<dyn FontProvider>,
    adjusted: HashMap<LayerId, AdjustedImage>,
}

impl Compositor {
    pub fn new(fonts: Arc<dyn FontProvider>) -> Self {
        Self { fonts, adjusted: HashMap::new() }
    }

    /// Compositor resolving fonts through the platform font source, with `extra_dirs` searched first.
    pub fn with_system_fonts(extra_dirs: &[std::path::PathBuf]) -> Self {
        Self::new(Arc::new(FontLibrary::system(extra_dirs)))
    }

    pub fn fonts(&self) -> &Arc<dyn FontProvider> {
        &self.fonts
    }

    /// Render `stack` onto a `width`×`height` surface.
    ///
    /// Image layers run through the adjustment engine with `adjustments` and
    /// `transform`; adjustment layers filter the composite beneath them.
    /// `preview` is drawn on top without being part of the stack.
    pub fn composite(
        &mut self,
        stack: &LayerStack,
        width: u32,
        height: u32,
        adjustments: &AdjustmentSet,
        transform: &TransformState,
        images: &ImageCache,
        preview: Option<&Layer>,
    ) -> CompositeOutput {
        let mut out = CompositeOutput {
            surface: RgbaImage::new(width, height),
            failed_layers: Vec::new(),
            pending_layers: Vec::new(),
            missing_fonts: Vec::new(),
        };
        self.adjusted.retain(|id, _| stack.position(id).is_some());

        for layer in stack.iter().chain(preview) {
            if !layer.visible {
                continue;
            }
            match &layer.content {
                LayerContent::Adjustment(set) => {
                    apply_adjustment_layer(&mut out.surface, set, layer.opacity, layer.blend_mode);
                }
                _ => {
                    if let Some(buf) = self.render_layer(layer, width, height, adjustments, transform, images, &mut out) {
                        blend_onto(&mut out.surface, &buf, layer.blend_mode, layer.opacity);
                    }
                }
            }
        }
        out
    }

    /// Rasterize one non-adjustment layer into a canvas-sized buffer, or
    /// record why it cannot be drawn this pass.
    fn render_layer(
        &mut self,
        layer: &Layer,
        width: u32,
        height: u32,
        adjustments: &AdjustmentSet,
        transform: &TransformState,
        images: &ImageCache,
        out: &mut CompositeOutput,
    ) -> Option<RgbaImage> {
        match &layer.content {
            LayerContent::Image(payload) => {
                let source = match (&payload.source, images.state(&layer.id)) {
                    (ImageSource::Raster(img), _) => img.clone(),
                    (_, Some(DecodeState::Ready(img))) => img.clone(),
                    (_, Some(DecodeState::Failed(reason))) => {
                        out.failed_layers.push(EditorError::Decode {
                            layer: layer.id.clone(),
                            reason: reason.clone(),
                        });
                        return None;
                    }
                    (_, Some(DecodeState::Pending) | None) => {
                        out.pending_layers.push(layer.id.clone());
                        return None;
                    }
                };
                let adjusted = self.adjusted_image(&layer.id, source, adjustments, transform);
                Some(place_at_origin(&adjusted, width, height))
            }
            LayerContent::Drawing(drawing) => Some(shapes::render_drawing(drawing, width, height)),
            LayerContent::Shape(shape) => Some(shapes::render_shape(shape, width, height)),
            LayerContent::Text(payload) => match self.fonts.resolve(&payload.font) {
                Some(font) => Some(text::render_text(&font, payload, width, height)),
                None => {
                    out.missing_fonts.push((layer.id.clone(), payload.font.clone()));
                    None
                }
            },
            LayerContent::Adjustment(_) => None,
        }
    }

    fn adjusted_image(
        &mut self,
        id: &LayerId,
        source: Arc<RgbaImage>,
        adjustments: &AdjustmentSet,
        transform: &TransformState,
    ) -> Arc<RgbaImage> {
        if let Some(hit) = self.adjusted.get(id)
            && Arc::ptr_eq(&hit.source, &source)
            && hit.adjustments == *adjustments
            && hit.transform == *transform
        {
            return hit.output.clone();
        }
        let output = if adjustments.is_identity() && transform.is_identity() {
            source.clone()
        } else {
            Arc::new(adjust::render(&source, adjustments, transform))
        };
        self.adjusted.insert(
            id.clone(),
            AdjustedImage {
                source,
                adjustments: *adjustments,
                transform: *transform,
                output: output.clone(),
            },
        );
        output
    }
}

/// Copy `img` onto a transparent canvas-sized buffer at (0, 0), cropping overflow.
fn place_at_origin(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    let mut buf = RgbaImage::new(width, height);
    image::imageops::replace(&mut buf, img, 0, 0);
    buf
}

/// Filter the surface with `set` and mix the result back by `opacity`.
fn apply_adjustment_layer(surface: &mut RgbaImage, set: &AdjustmentSet, opacity: f32, mode: BlendMode) {
    if set.is_identity() || opacity <= 0.0 {
        return;
    }
    let filtered = adjust::apply_filters(surface, set);
    if mode != BlendMode::Normal {
        blend_onto(surface, &filtered, mode, opacity);
        return;
    }
    if opacity >= 1.0 {
        *surface = filtered;
        return;
    }
    let stride = surface.width() as usize * 4;
    if stride == 0 {
        return;
    }
    let raw: &mut [u8] = surface;
    raw.par_chunks_mut(stride)
        .zip(filtered.as_raw().par_chunks(stride))
        .for_each(|(row, f_row)| {
            for (d, &f) in row.iter_mut().zip(f_row) {
                let v = *d as f32 + (f as f32 - *d as f32) * opacity;
                *d = v.round().clamp(0.0, 255.0) as u8;
            }
        });
}

/// Blend `top` (same size as `surface`) onto `surface` row-parallel.
pub fn blend_onto(surface: &mut RgbaImage, top: &RgbaImage, mode: BlendMode, opacity: f32) {
    if opacity <= 0.0 || surface.dimensions() != top.dimensions() {
        return;
    }
    let stride = surface.width() as usize * 4;
    if stride == 0 {
        return;
    }
    let raw: &mut [u8] = surface;
    raw.par_chunks_mut(stride)
        .zip(top.as_raw().par_chunks(stride))
        .for_each(|(row, top_row)| {
            for (dst, src) in row.chunks_exact_mut(4).zip(top_row.chunks_exact(4)) {
                let base = Rgba([dst[0], dst[1], dst[2], dst[3]]);
                let t = Rgba([src[0], src[1], src[2], src[3]]);
                dst.copy_from_slice(&blend_pixel(base, t, mode, opacity).0);
            }
        });
}

/// Blend one straight-alpha pixel over another.
///
/// The blend function mixes with the top colour in proportion to the base
/// alpha, then the result is source-over composited with
/// `top_alpha × opacity`.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    // Fast path: fully transparent top pixel
    if top[3] == 0 {
        return base;
    }
    // Fast path: Normal blend, full opacity, opaque top
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let (r, g, b) = match mode {
        BlendMode::Normal => (top_r, top_g, top_b),
        BlendMode::Multiply => (base_r * top_r, base_g * top_g, base_b * top_b),
        BlendMode::Screen => (
            1.0 - (1.0 - base_r) * (1.0 - top_r),
            1.0 - (1.0 - base_g) * (1.0 - top_g),
            1.0 - (1.0 - base_b) * (1.0 - top_b),
        ),
        BlendMode::Overlay => (
            overlay_channel(base_r, top_r),
            overlay_channel(base_g, top_g),
            overlay_channel(base_b, top_b),
        ),
        BlendMode::Darken => (base_r.min(top_r), base_g.min(top_g), base_b.min(top_b)),
        BlendMode::Lighten => (base_r.max(top_r), base_g.max(top_g), base_b.max(top_b)),
    };

    // Over a transparent base the blend function has nothing to act on.
    let mix = |blended: f32, top_c: f32| (1.0 - base_a) * top_c + base_a * blended;
    let (r, g, b) = (mix(r, top_r), mix(g, top_g), mix(b, top_b));

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    Rgba([
        (out_r * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_g * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_b * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[inline]
fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}
