// ============================================================================
// TEXT — font resolution and rotated single-line text rasterization
// ============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use ab_glyph::{Font, FontArc, FontVec, GlyphId, ScaleFont, point};
use font_kit::family_name::FamilyName;
use font_kit::handle::Handle;
use font_kit::properties::Properties;
use font_kit::source::{Source, SystemSource};
use font_kit::sources::fs::FsSource;
use image::RgbaImage;

use crate::layer::{TextAlignment, TextPayload};
use crate::shapes::blend_over;
use crate::{log_info, log_warn};

/// Resolves a font family name to a loaded face.
///
/// The compositor only ever asks for a family by name; a `None` answer means
/// the text layer is skipped for that pass and reported as missing.
pub trait FontProvider: Send + Sync {
    fn resolve(&self, family: &str) -> Option<FontArc>;
}

/// Family lookup layered over font-kit.
///
/// Resolution order: faces handed to [`register`](Self::register), then the
/// configured font directories, then the platform font source.  When the
/// platform has no face for the family, its generic sans-serif face is used
/// so the default `"Arial"` still renders on hosts without it.  Libraries
/// built with [`new`](Self::new) never consult the platform.
pub struct FontLibrary {
    dirs: Vec<PathBuf>,
    system: bool,
    registered: HashMap<String, FontArc>,
    cache: Mutex<HashMap<String, Option<FontArc>>>,
}

impl FontLibrary {
    /// Only registered faces and fonts under `dirs`.
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            system: false,
            registered: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `extra` directories overlaid on the platform font source.
    pub fn system(extra: &[PathBuf]) -> Self {
        Self { system: true, ..Self::new(extra.to_vec()) }
    }

    /// Make `font` available under `family`, ahead of anything on disk.
    pub fn register(&mut self, family: &str, font: FontArc) {
        self.registered.insert(normalize_family(family), font);
    }

    /// Parse `bytes` as a TrueType/OpenType face and register it.
    pub fn register_bytes(&mut self, family: &str, bytes: Vec<u8>) -> bool {
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                self.register(family, font);
                true
            }
            Err(e) => {
                log_warn!("Font '{}' could not be parsed: {}", family, e);
                false
            }
        }
    }

    fn load(&self, family: &str) -> Option<FontArc> {
        let wanted = [family_name(family)];
        let props = Properties::new();

        for dir in &self.dirs {
            let source = FsSource::in_path(dir);
            if let Ok(handle) = source.select_best_match(&wanted, &props)
                && let Some(font) = face_from_handle(&handle)
            {
                log_info!("Font '{}' loaded from {}", family, dir.display());
                return Some(font);
            }
        }
        if !self.system {
            return None;
        }

        let source = SystemSource::new();
        if let Ok(handle) = source.select_best_match(&wanted, &props)
            && let Some(font) = face_from_handle(&handle)
        {
            return Some(font);
        }
        log_warn!("Font '{}' not installed, using the sans-serif face", family);
        let handle = source.select_best_match(&[FamilyName::SansSerif], &props).ok()?;
        face_from_handle(&handle)
    }
}

impl FontProvider for FontLibrary {
    fn resolve(&self, family: &str) -> Option<FontArc> {
        let key = normalize_family(family);
        if let Some(font) = self.registered.get(&key) {
            return Some(font.clone());
        }
        if let Ok(cache) = self.cache.lock()
            && let Some(hit) = cache.get(&key)
        {
            return hit.clone();
        }
        let loaded = self.load(family);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, loaded.clone());
        }
        loaded
    }
}

fn normalize_family(family: &str) -> String {
    family
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// CSS generic keywords map to font-kit's generic families.
fn family_name(family: &str) -> FamilyName {
    match normalize_family(family).as_str() {
        "sansserif" => FamilyName::SansSerif,
        "serif" => FamilyName::Serif,
        "monospace" => FamilyName::Monospace,
        "cursive" => FamilyName::Cursive,
        "fantasy" => FamilyName::Fantasy,
        _ => FamilyName::Title(family.trim().to_string()),
    }
}

fn face_from_handle(handle: &Handle) -> Option<FontArc> {
    let (bytes, index) = match handle {
        Handle::Path { path, font_index } => match std::fs::read(path) {
            Ok(bytes) => (bytes, *font_index),
            Err(e) => {
                log_warn!("Font file {} unreadable: {}", path.display(), e);
                return None;
            }
        },
        Handle::Memory { bytes, font_index } => (bytes.as_ref().clone(), *font_index),
    };
    match FontVec::try_from_vec_and_index(bytes, index) {
        Ok(font) => Some(FontArc::new(font)),
        Err(e) => {
            log_warn!("Font face {} invalid: {}", index, e);
            None
        }
    }
}

// ============================================================================
// LAYOUT & RASTERIZATION
// ============================================================================

/// Lay out a single line on a baseline at y = 0, shifted for `alignment`.
/// Returns `(glyphs, total_width)`.
pub fn layout_text(
    font: &FontArc,
    text: &str,
    font_size: f32,
    alignment: TextAlignment,
) -> (Vec<(GlyphId, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;

    for ch in text.chars().filter(|c| !c.is_control()) {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }

    let offset = match alignment {
        TextAlignment::Left => 0.0,
        TextAlignment::Center => -cursor_x * 0.5,
        TextAlignment::Right => -cursor_x,
    };
    for glyph in &mut glyphs {
        glyph.1 += offset;
    }
    (glyphs, cursor_x)
}

/// Single-channel glyph coverage; `(x0, y0)` is the top-left in the
/// coordinate space the glyphs were positioned in.
struct Coverage {
    data: Vec<f32>,
    x0: i32,
    y0: i32,
    w: usize,
    h: usize,
}

impl Coverage {
    fn at(&self, x: i32, y: i32) -> f32 {
        let lx = x - self.x0;
        let ly = y - self.y0;
        if lx < 0 || ly < 0 || lx as usize >= self.w || ly as usize >= self.h {
            0.0
        } else {
            self.data[ly as usize * self.w + lx as usize]
        }
    }

    fn bilinear(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor() as i32;
        let y0 = y.floor() as i32;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let top = self.at(x0, y0) * (1.0 - fx) + self.at(x0 + 1, y0) * fx;
        let bot = self.at(x0, y0 + 1) * (1.0 - fx) + self.at(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bot * fy
    }
}

fn glyph_coverage(font: &FontArc, text: &TextPayload, origin_x: f32, origin_y: f32) -> Option<Coverage> {
    let (glyphs, _) = layout_text(font, &text.content, text.size, text.align);
    let outlined: Vec<_> = glyphs
        .iter()
        .filter_map(|&(id, gx)| {
            font.outline_glyph(id.with_scale_and_position(text.size, point(origin_x + gx, origin_y)))
        })
        .collect();
    if outlined.is_empty() {
        return None;
    }

    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for g in &outlined {
        let b = g.px_bounds();
        min_x = min_x.min(b.min.x);
        min_y = min_y.min(b.min.y);
        max_x = max_x.max(b.max.x);
        max_y = max_y.max(b.max.y);
    }
    let x0 = min_x.floor() as i32;
    let y0 = min_y.floor() as i32;
    let w = (max_x.ceil() as i32 - x0).max(0) as usize;
    let h = (max_y.ceil() as i32 - y0).max(0) as usize;
    if w == 0 || h == 0 {
        return None;
    }

    let mut data = vec![0.0f32; w * h];
    for g in &outlined {
        let b = g.px_bounds();
        let bx = b.min.x as i32 - x0;
        let by = b.min.y as i32 - y0;
        g.draw(|px, py, cov| {
            let x = bx + px as i32;
            let y = by + py as i32;
            if x >= 0 && y >= 0 && (x as usize) < w && (y as usize) < h {
                let idx = y as usize * w + x as usize;
                data[idx] = data[idx].max(cov);
            }
        });
    }
    Some(Coverage { data, x0, y0, w, h })
}

/// Draw `text` onto `buf`: anchored at (x, y) on the baseline, aligned
/// horizontally, rotated clockwise about the anchor.
pub fn draw_text(buf: &mut RgbaImage, font: &FontArc, text: &TextPayload) {
    if text.content.is_empty() || text.size <= 0.0 || text.color.a == 0 {
        return;
    }
    let color = text.color.to_array();
    let (w, h) = buf.dimensions();
    let rotation = text.rotation.rem_euclid(360.0);

    if rotation == 0.0 {
        let Some(cov) = glyph_coverage(font, text, text.x, text.y) else { return };
        for ly in 0..cov.h {
            let y = cov.y0 + ly as i32;
            if y < 0 || y >= h as i32 {
                continue;
            }
            for lx in 0..cov.w {
                let x = cov.x0 + lx as i32;
                if x < 0 || x >= w as i32 {
                    continue;
                }
                let c = cov.data[ly * cov.w + lx];
                if c > 0.001 {
                    let px = buf.get_pixel_mut(x as u32, y as u32);
                    blend_over(&mut px.0, color, c);
                }
            }
        }
        return;
    }

    let Some(cov) = glyph_coverage(font, text, 0.0, 0.0) else { return };
    let (sin, cos) = rotation.to_radians().sin_cos();

    // Canvas-space bounds of the rotated coverage box.
    let corners = [
        (cov.x0 as f32, cov.y0 as f32),
        ((cov.x0 + cov.w as i32) as f32, cov.y0 as f32),
        (cov.x0 as f32, (cov.y0 + cov.h as i32) as f32),
        ((cov.x0 + cov.w as i32) as f32, (cov.y0 + cov.h as i32) as f32),
    ];
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for (lx, ly) in corners {
        let cx = text.x + lx * cos - ly * sin;
        let cy = text.y + lx * sin + ly * cos;
        min_x = min_x.min(cx);
        min_y = min_y.min(cy);
        max_x = max_x.max(cx);
        max_y = max_y.max(cy);
    }
    let x0 = (min_x.floor() as i64 - 1).clamp(0, w as i64) as u32;
    let y0 = (min_y.floor() as i64 - 1).clamp(0, h as i64) as u32;
    let x1 = (max_x.ceil() as i64 + 1).clamp(0, w as i64) as u32;
    let y1 = (max_y.ceil() as i64 + 1).clamp(0, h as i64) as u32;

    for y in y0..y1 {
        let dy = y as f32 + 0.5 - text.y;
        for x in x0..x1 {
            let dx = x as f32 + 0.5 - text.x;
            let lx = cos * dx + sin * dy;
            let ly = -sin * dx + cos * dy;
            let c = cov.bilinear(lx - 0.5, ly - 0.5);
            if c > 0.001 {
                blend_over(&mut buf.get_pixel_mut(x, y).0, color, c);
            }
        }
    }
}

/// Render a text layer into a fresh transparent buffer.
pub fn render_text(font: &FontArc, text: &TextPayload, width: u32, height: u32) -> RgbaImage {
    let mut buf = RgbaImage::new(width, height);
    draw_text(&mut buf, font, text);
    buf
}
