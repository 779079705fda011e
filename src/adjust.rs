// ============================================================================
// ADJUSTMENT ENGINE — transform + colour filter chain over a source raster
// ============================================================================
//
// Pure functions.  The transform runs first (rotate/flip about the centre,
// output keeps the source dimensions), then the filters in a fixed order:
//
//   brightness → contrast → saturation → sepia → blur → hue → grayscale → invert
//
// Colour filters are the CSS Filter Effects formulas on straight-alpha
// values in [0, 1], clamped after every stage.  Blur is a separable Gaussian
// over premultiplied colour.  Rows are processed in parallel via rayon.
// ============================================================================

use std::str::FromStr;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Upper bound of the blur slider unless the settings say otherwise.
pub const DEFAULT_MAX_BLUR: f32 = 50.0;

/// One adjustable parameter of an [`AdjustmentSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Brightness,
    Contrast,
    Saturation,
    Blur,
    HueRotate,
    Sepia,
    Grayscale,
    Invert,
}

impl Adjustment {
    /// Pipeline order.
    pub fn all() -> &'static [Adjustment] {
        &[
            Adjustment::Brightness,
            Adjustment::Contrast,
            Adjustment::Saturation,
            Adjustment::Sepia,
            Adjustment::Blur,
            Adjustment::HueRotate,
            Adjustment::Grayscale,
            Adjustment::Invert,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Adjustment::Brightness => "brightness",
            Adjustment::Contrast => "contrast",
            Adjustment::Saturation => "saturation",
            Adjustment::Blur => "blur",
            Adjustment::HueRotate => "hue_rotate",
            Adjustment::Sepia => "sepia",
            Adjustment::Grayscale => "grayscale",
            Adjustment::Invert => "invert",
        }
    }

    /// Value at which the stage leaves pixels untouched.
    pub fn identity(&self) -> f32 {
        match self {
            Adjustment::Brightness | Adjustment::Contrast | Adjustment::Saturation => 100.0,
            _ => 0.0,
        }
    }

    /// Accepted range; `max_blur` bounds the blur radius.
    pub fn range(&self, max_blur: f32) -> (f32, f32) {
        match self {
            Adjustment::Brightness | Adjustment::Contrast | Adjustment::Saturation => (0.0, 200.0),
            Adjustment::Blur => (0.0, max_blur.max(0.0)),
            Adjustment::HueRotate => (0.0, 360.0),
            Adjustment::Sepia | Adjustment::Grayscale | Adjustment::Invert => (0.0, 100.0),
        }
    }
}

impl FromStr for Adjustment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        match key.as_str() {
            "hue" => Ok(Adjustment::HueRotate),
            "saturate" => Ok(Adjustment::Saturation),
            _ => Adjustment::all()
                .iter()
                .copied()
                .find(|a| a.name() == key)
                .ok_or_else(|| format!("unknown adjustment '{s}'")),
        }
    }
}

/// Filter parameters.  Percentages for everything except blur (px) and hue (degrees).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdjustmentSet {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub blur: f32,
    pub hue_rotate: f32,
    pub sepia: f32,
    pub grayscale: f32,
    pub invert: f32,
}

impl Default for AdjustmentSet {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            blur: 0.0,
            hue_rotate: 0.0,
            sepia: 0.0,
            grayscale: 0.0,
            invert: 0.0,
        }
    }
}

impl AdjustmentSet {
    pub fn get(&self, adj: Adjustment) -> f32 {
        match adj {
            Adjustment::Brightness => self.brightness,
            Adjustment::Contrast => self.contrast,
            Adjustment::Saturation => self.saturation,
            Adjustment::Blur => self.blur,
            Adjustment::HueRotate => self.hue_rotate,
            Adjustment::Sepia => self.sepia,
            Adjustment::Grayscale => self.grayscale,
            Adjustment::Invert => self.invert,
        }
    }

    fn slot(&mut self, adj: Adjustment) -> &mut f32 {
        match adj {
            Adjustment::Brightness => &mut self.brightness,
            Adjustment::Contrast => &mut self.contrast,
            Adjustment::Saturation => &mut self.saturation,
            Adjustment::Blur => &mut self.blur,
            Adjustment::HueRotate => &mut self.hue_rotate,
            Adjustment::Sepia => &mut self.sepia,
            Adjustment::Grayscale => &mut self.grayscale,
            Adjustment::Invert => &mut self.invert,
        }
    }

    /// Store `value` clamped to the adjustment's range.
    pub fn set(&mut self, adj: Adjustment, value: f32) {
        self.set_clamped(adj, value, DEFAULT_MAX_BLUR);
    }

    /// [`set`](Self::set) with an explicit blur ceiling.  NaN resets to identity.
    pub fn set_clamped(&mut self, adj: Adjustment, value: f32, max_blur: f32) {
        let (lo, hi) = adj.range(max_blur);
        *self.slot(adj) = if value.is_nan() { adj.identity() } else { value.clamp(lo, hi) };
    }

    pub fn with(mut self, adj: Adjustment, value: f32) -> Self {
        self.set(adj, value);
        self
    }

    /// Clamp every field, e.g. after deserializing untrusted input.
    pub fn sanitized(mut self, max_blur: f32) -> Self {
        for &adj in Adjustment::all() {
            let v = self.get(adj);
            self.set_clamped(adj, v, max_blur);
        }
        self
    }

    pub fn is_identity(&self) -> bool {
        Adjustment::all().iter().all(|&a| stage_is_identity(a, self.get(a)))
    }
}

fn stage_is_identity(adj: Adjustment, value: f32) -> bool {
    match adj {
        Adjustment::HueRotate => value.rem_euclid(360.0) == 0.0,
        _ => value == adj.identity(),
    }
}

/// Whole-image rotate/flip applied about the canvas centre.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformState {
    /// Degrees clockwise; unbounded, wraps for display.
    pub rotate: i32,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl TransformState {
    pub fn display_rotation(&self) -> i32 {
        self.rotate.rem_euclid(360)
    }

    pub fn is_identity(&self) -> bool {
        self.display_rotation() == 0 && !self.flip_x && !self.flip_y
    }
}

// ============================================================================
// ENTRY POINTS
// ============================================================================

/// Transform then filter `source`.  Output has the source's dimensions.
pub fn render(source: &RgbaImage, adj: &AdjustmentSet, transform: &TransformState) -> RgbaImage {
    let transformed = if transform.is_identity() {
        source.clone()
    } else {
        apply_transform(source, transform)
    };
    if adj.is_identity() {
        transformed
    } else {
        apply_filters(&transformed, adj)
    }
}

/// Rotate and flip about the image centre.
///
/// Quarter turns map pixels exactly; any other angle samples bilinearly.
/// Destination pixels with no source coverage stay transparent.
pub fn apply_transform(src: &RgbaImage, transform: &TransformState) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 || transform.is_identity() {
        return src.clone();
    }

    let deg = transform.display_rotation();
    let (cos, sin) = match deg {
        0 => (1.0, 0.0),
        90 => (0.0, 1.0),
        180 => (-1.0, 0.0),
        270 => (0.0, -1.0),
        _ => {
            let rad = (deg as f32).to_radians();
            (rad.cos(), rad.sin())
        }
    };
    let exact = deg % 90 == 0;
    let sx = if transform.flip_x { -1.0 } else { 1.0 };
    let sy = if transform.flip_y { -1.0 } else { 1.0 };
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;

    let stride = w as usize * 4;
    let mut dst_raw = vec![0u8; stride * h as usize];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let dy = y as f32 + 0.5 - cy;
        for x in 0..w as usize {
            let dx = x as f32 + 0.5 - cx;
            // Inverse of translate(c) · rotate(θ) · scale(flip) · translate(-c).
            let px = cx + sx * (cos * dx + sin * dy);
            let py = cy + sy * (-sin * dx + cos * dy);
            let pixel = if exact {
                nearest_sample(src, px, py)
            } else {
                bilinear_sample(src, px - 0.5, py - 0.5)
            };
            row_out[x * 4..x * 4 + 4].copy_from_slice(&pixel.0);
        }
    });

    RgbaImage::from_raw(w, h, dst_raw).unwrap_or_else(|| src.clone())
}

/// Run the colour filter chain (no transform).
pub fn apply_filters(src: &RgbaImage, adj: &AdjustmentSet) -> RgbaImage {
    let mut out = src.clone();
    let mut pending: Vec<ColorStage> = Vec::new();

    for &stage in Adjustment::all() {
        let value = adj.get(stage);
        if stage_is_identity(stage, value) {
            continue;
        }
        if stage == Adjustment::Blur {
            apply_color_stages(&mut out, &pending);
            pending.clear();
            out = gaussian_blur_premultiplied(&out, value);
        } else {
            pending.push(ColorStage::for_adjustment(stage, value));
        }
    }
    apply_color_stages(&mut out, &pending);
    out
}

// ============================================================================
// COLOUR STAGES
// ============================================================================

/// `out = clamp(m · rgb + offset)` on straight-alpha channels in [0, 1].
#[derive(Clone, Copy, Debug)]
struct ColorStage {
    m: [[f32; 3]; 3],
    offset: [f32; 3],
}

impl ColorStage {
    fn scale(k: f32, offset: f32) -> Self {
        Self {
            m: [[k, 0.0, 0.0], [0.0, k, 0.0], [0.0, 0.0, k]],
            offset: [offset; 3],
        }
    }

    fn matrix(m: [[f32; 3]; 3]) -> Self {
        Self { m, offset: [0.0; 3] }
    }

    fn for_adjustment(adj: Adjustment, value: f32) -> Self {
        match adj {
            Adjustment::Brightness => Self::scale(value / 100.0, 0.0),
            Adjustment::Contrast => {
                let c = value / 100.0;
                Self::scale(c, 0.5 - 0.5 * c)
            }
            Adjustment::Saturation => {
                let s = value / 100.0;
                Self::matrix([
                    [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
                    [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
                    [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
                ])
            }
            Adjustment::Sepia => {
                let k = 1.0 - (value / 100.0).clamp(0.0, 1.0);
                Self::matrix([
                    [0.393 + 0.607 * k, 0.769 - 0.769 * k, 0.189 - 0.189 * k],
                    [0.349 - 0.349 * k, 0.686 + 0.314 * k, 0.168 - 0.168 * k],
                    [0.272 - 0.272 * k, 0.534 - 0.534 * k, 0.131 + 0.869 * k],
                ])
            }
            Adjustment::HueRotate => {
                let rad = value.to_radians();
                let (s, c) = rad.sin_cos();
                Self::matrix([
                    [
                        0.213 + c * 0.787 - s * 0.213,
                        0.715 - c * 0.715 - s * 0.715,
                        0.072 - c * 0.072 + s * 0.928,
                    ],
                    [
                        0.213 - c * 0.213 + s * 0.143,
                        0.715 + c * 0.285 + s * 0.140,
                        0.072 - c * 0.072 - s * 0.283,
                    ],
                    [
                        0.213 - c * 0.213 - s * 0.787,
                        0.715 - c * 0.715 + s * 0.715,
                        0.072 + c * 0.928 + s * 0.072,
                    ],
                ])
            }
            Adjustment::Grayscale => {
                let k = 1.0 - (value / 100.0).clamp(0.0, 1.0);
                Self::matrix([
                    [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
                    [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
                    [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
                ])
            }
            Adjustment::Invert => {
                let a = (value / 100.0).clamp(0.0, 1.0);
                Self::scale(1.0 - 2.0 * a, a)
            }
            // Blur never reaches the colour path.
            Adjustment::Blur => Self::scale(1.0, 0.0),
        }
    }

    #[inline]
    fn apply(&self, rgb: [f32; 3]) -> [f32; 3] {
        let mut out = [0.0f32; 3];
        for (i, row) in self.m.iter().enumerate() {
            let v = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2] + self.offset[i];
            out[i] = v.clamp(0.0, 1.0);
        }
        out
    }
}

fn apply_color_stages(img: &mut RgbaImage, stages: &[ColorStage]) {
    if stages.is_empty() {
        return;
    }
    let stride = img.width() as usize * 4;
    if stride == 0 {
        return;
    }
    let raw: &mut [u8] = img;
    raw.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let mut rgb = [px[0] as f32 / 255.0, px[1] as f32 / 255.0, px[2] as f32 / 255.0];
            for stage in stages {
                rgb = stage.apply(rgb);
            }
            px[0] = (rgb[0] * 255.0).round() as u8;
            px[1] = (rgb[1] * 255.0).round() as u8;
            px[2] = (rgb[2] * 255.0).round() as u8;
        }
    });
}

// ============================================================================
// SAMPLING & BLUR
// ============================================================================

fn nearest_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let sx = x.floor() as i64;
    let sy = y.floor() as i64;
    if sx < 0 || sy < 0 || sx >= img.width() as i64 || sy >= img.height() as i64 {
        Rgba([0, 0, 0, 0])
    } else {
        *img.get_pixel(sx as u32, sy as u32)
    }
}

/// Bilinear sample in pixel-index space; texels outside the image are transparent.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut v = [0.0f32; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        v[c] = lerp(top, bot, fy);
    }
    unpremultiply(v)
}

#[inline]
fn unpremultiply(v: [f32; 4]) -> Rgba<u8> {
    let a = v[3].round().clamp(0.0, 255.0);
    if a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }
    let inv = 255.0 / v[3];
    Rgba([
        (v[0] * inv).round().clamp(0.0, 255.0) as u8,
        (v[1] * inv).round().clamp(0.0, 255.0) as u8,
        (v[2] * inv).round().clamp(0.0, 255.0) as u8,
        a as u8,
    ])
}

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable Gaussian over premultiplied colour, clamp-to-edge sampling.
fn gaussian_blur_premultiplied(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let stride = w * 4;

    let buf_in: Vec<f32> = src
        .as_raw()
        .chunks_exact(4)
        .flat_map(|p| {
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        })
        .collect();

    // Horizontal pass
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // Vertical pass, unpremultiplying into the output row
    let mut dst_raw = vec![0u8; w * h * 4];
    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&unpremultiply(acc).0);
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap_or_else(|| src.clone())
}
