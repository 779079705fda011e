// ============================================================================
// STROKE & SHAPE RASTERIZER — SDF coverage, anti-aliased outlines
// ============================================================================
//
// Every primitive is a signed distance function evaluated at pixel centres;
// coverage is `smoothstep(0.5, -0.5, d)` which gives a one-pixel AA ramp.
// Coverage is composited source-over into the layer's own buffer so that
// several strokes in one drawing layer stack like they would on a canvas.
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::layer::{Color, DrawingPayload, Point, ShapeKind, ShapePayload, Stroke};

/// Render every stroke of a drawing layer into a fresh transparent buffer.
pub fn render_drawing(drawing: &DrawingPayload, width: u32, height: u32) -> RgbaImage {
    let mut buf = RgbaImage::new(width, height);
    for stroke in &drawing.strokes {
        draw_stroke(&mut buf, stroke);
    }
    buf
}

/// Render a shape outline into a fresh transparent buffer.
pub fn render_shape(shape: &ShapePayload, width: u32, height: u32) -> RgbaImage {
    let mut buf = RgbaImage::new(width, height);
    draw_shape(&mut buf, shape);
    buf
}

/// Connected polyline with round caps and joins.  A single-point stroke is a dot.
pub fn draw_stroke(buf: &mut RgbaImage, stroke: &Stroke) {
    if stroke.points.is_empty() || stroke.width <= 0.0 || stroke.color.a == 0 {
        return;
    }
    let half = stroke.width * 0.5;
    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for p in &stroke.points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let pad = half + 1.0;
    let points = &stroke.points;

    paint_coverage(
        buf,
        (min_x - pad, min_y - pad, max_x + pad, max_y + pad),
        stroke.color,
        |px, py| {
            let d = polyline_distance(points, px, py);
            smoothstep(0.5, -0.5, d - half)
        },
    );
}

/// Unfilled outline of a rectangle, inscribed circle or line.
pub fn draw_shape(buf: &mut RgbaImage, shape: &ShapePayload) {
    if shape.stroke_width <= 0.0 || shape.color.a == 0 {
        return;
    }
    let half = shape.stroke_width * 0.5;
    let pad = half + 1.0;

    match shape.kind {
        ShapeKind::Rectangle => {
            let hx = shape.width.abs() * 0.5;
            let hy = shape.height.abs() * 0.5;
            let cx = shape.x + shape.width * 0.5;
            let cy = shape.y + shape.height * 0.5;
            let has_hole = hx > half && hy > half;
            paint_coverage(
                buf,
                (cx - hx - pad, cy - hy - pad, cx + hx + pad, cy + hy + pad),
                shape.color,
                |px, py| {
                    // Mitered outline: outer box minus inner box.
                    let lx = px - cx;
                    let ly = py - cy;
                    let outer = smoothstep(0.5, -0.5, sdf_box(lx, ly, hx + half, hy + half));
                    let inner = if has_hole {
                        smoothstep(0.5, -0.5, sdf_box(lx, ly, hx - half, hy - half))
                    } else {
                        0.0
                    };
                    outer * (1.0 - inner)
                },
            );
        }
        ShapeKind::Circle => {
            let r = shape.width.abs().min(shape.height.abs()) * 0.5;
            let cx = shape.x + shape.width * 0.5;
            let cy = shape.y + shape.height * 0.5;
            paint_coverage(
                buf,
                (cx - r - pad, cy - r - pad, cx + r + pad, cy + r + pad),
                shape.color,
                |px, py| {
                    let d = ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt() - r;
                    smoothstep(0.5, -0.5, d.abs() - half)
                },
            );
        }
        ShapeKind::Line => {
            let (ax, ay) = (shape.x, shape.y);
            let (bx, by) = (shape.x + shape.width, shape.y + shape.height);
            let len = (shape.width * shape.width + shape.height * shape.height).sqrt();
            if len == 0.0 {
                return;
            }
            let (ux, uy) = (shape.width / len, shape.height / len);
            paint_coverage(
                buf,
                (ax.min(bx) - pad, ay.min(by) - pad, ax.max(bx) + pad, ay.max(by) + pad),
                shape.color,
                |px, py| {
                    // Butt caps: a box aligned with the segment.
                    let dx = px - ax;
                    let dy = py - ay;
                    let along = dx * ux + dy * uy;
                    let across = -dx * uy + dy * ux;
                    smoothstep(0.5, -0.5, sdf_box(along - len * 0.5, across, len * 0.5, half))
                },
            );
        }
    }
}

// ============================================================================
// COVERAGE → PIXELS
// ============================================================================

/// Evaluate `coverage(px, py)` at pixel centres inside `bounds` (min_x, min_y,
/// max_x, max_y) and composite `color` source-over with that coverage.
fn paint_coverage<F>(buf: &mut RgbaImage, bounds: (f32, f32, f32, f32), color: Color, coverage: F)
where
    F: Fn(f32, f32) -> f32 + Sync,
{
    let (w, h) = buf.dimensions();
    let x0 = (bounds.0.floor() as i64).clamp(0, w as i64) as usize;
    let y0 = (bounds.1.floor() as i64).clamp(0, h as i64) as usize;
    let x1 = (bounds.2.ceil() as i64).clamp(0, w as i64) as usize;
    let y1 = (bounds.3.ceil() as i64).clamp(0, h as i64) as usize;
    if x0 >= x1 || y0 >= y1 {
        return;
    }

    let stride = w as usize * 4;
    let rgba = color.to_array();
    let raw: &mut [u8] = buf;
    raw.par_chunks_mut(stride)
        .enumerate()
        .skip(y0)
        .take(y1 - y0)
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for x in x0..x1 {
                let cov = coverage(x as f32 + 0.5, py);
                if cov > 0.001 {
                    blend_over(&mut row[x * 4..x * 4 + 4], rgba, cov);
                }
            }
        });
}

/// Source-over of a straight-alpha colour scaled by `coverage` onto `dst`.
#[inline]
pub(crate) fn blend_over(dst: &mut [u8], src: [u8; 4], coverage: f32) {
    let sa = src[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for c in 0..3 {
        let v = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

// ============================================================================
// SDF HELPERS
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

/// Distance from (px, py) to the segment a→b; degenerate segments act as points.
#[inline]
fn segment_distance(px: f32, py: f32, a: Point, b: Point) -> f32 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len2 = dx * dx + dy * dy;
    let t = if len2 > 0.0 {
        (((px - a.x) * dx + (py - a.y) * dy) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let cx = a.x + t * dx;
    let cy = a.y + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

fn polyline_distance(points: &[Point], px: f32, py: f32) -> f32 {
    match points {
        [] => f32::MAX,
        [only] => segment_distance(px, py, *only, *only),
        _ => points
            .windows(2)
            .map(|seg| segment_distance(px, py, seg[0], seg[1]))
            .fold(f32::MAX, f32::min),
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(kind: ShapeKind, x: f32, y: f32, w: f32, h: f32) -> ShapePayload {
        ShapePayload { kind, x, y, width: w, height: h, color: Color::BLACK, stroke_width: 2.0 }
    }

    #[test]
    fn circle_outline_has_inscribed_radius() {
        let img = render_shape(&shape(ShapeKind::Circle, 10.0, 10.0, 20.0, 20.0), 40, 40);
        // On the ring: ten pixels right of the centre at (20, 20).
        assert_eq!(img.get_pixel(29, 19)[3], 255);
        assert_eq!(img.get_pixel(10, 19)[3], 255);
        assert_eq!(img.get_pixel(19, 10)[3], 255);
        // Centre and well outside stay empty.
        assert_eq!(img.get_pixel(19, 19)[3], 0);
        assert_eq!(img.get_pixel(32, 19)[3], 0);
        assert_eq!(img.get_pixel(5, 5)[3], 0);
    }

    #[test]
    fn circle_in_wide_box_uses_smaller_side() {
        let img = render_shape(&shape(ShapeKind::Circle, 0.0, 0.0, 40.0, 10.0), 40, 20);
        // Radius 5 around (20, 5).
        assert_eq!(img.get_pixel(24, 4)[3], 255);
        assert_eq!(img.get_pixel(34, 4)[3], 0);
    }

    #[test]
    fn rectangle_is_unfilled() {
        let img = render_shape(&shape(ShapeKind::Rectangle, 5.0, 5.0, 10.0, 10.0), 20, 20);
        assert_eq!(img.get_pixel(5, 10)[3], 255);
        assert_eq!(img.get_pixel(14, 10)[3], 255);
        assert_eq!(img.get_pixel(10, 5)[3], 255);
        // Mitered corner is covered.
        assert_eq!(img.get_pixel(4, 4)[3], 255);
        assert_eq!(img.get_pixel(10, 10)[3], 0);
    }

    #[test]
    fn line_runs_across_box_diagonal_with_signed_extent() {
        let img = render_shape(&shape(ShapeKind::Line, 18.0, 2.0, -16.0, 16.0), 20, 20);
        assert!(img.get_pixel(10, 9)[3] > 0);
        assert!(img.get_pixel(16, 3)[3] > 0);
        assert_eq!(img.get_pixel(3, 3)[3], 0);
    }

    #[test]
    fn stroke_draws_polyline_in_its_colour() {
        let stroke = Stroke {
            points: vec![Point::new(2.0, 5.5), Point::new(18.0, 5.5), Point::new(18.0, 15.0)],
            color: Color::rgb(255, 0, 0),
            width: 3.0,
        };
        let img = render_drawing(&DrawingPayload { strokes: vec![stroke] }, 20, 20);
        assert_eq!(img.get_pixel(10, 5).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(17, 12).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(10, 12)[3], 0);
    }

    #[test]
    fn single_point_stroke_is_a_round_dot() {
        let stroke = Stroke::new(Point::new(10.0, 10.0), Color::BLACK, 6.0);
        let img = render_drawing(&DrawingPayload { strokes: vec![stroke] }, 20, 20);
        assert_eq!(img.get_pixel(10, 10)[3], 255);
        assert_eq!(img.get_pixel(11, 9)[3], 255);
        assert_eq!(img.get_pixel(13, 13)[3], 0);
    }

    #[test]
    fn later_strokes_cover_earlier_ones() {
        let red = Stroke {
            points: vec![Point::new(0.0, 5.0), Point::new(10.0, 5.0)],
            color: Color::rgb(255, 0, 0),
            width: 4.0,
        };
        let blue = Stroke { color: Color::rgb(0, 0, 255), ..red.clone() };
        let img = render_drawing(&DrawingPayload { strokes: vec![red, blue] }, 10, 10);
        assert_eq!(img.get_pixel(5, 5).0, [0, 0, 255, 255]);
    }

    #[test]
    fn blend_over_mixes_by_coverage() {
        let mut px = [255u8, 255, 255, 255];
        blend_over(&mut px, [0, 0, 0, 255], 0.5);
        assert_eq!(px, [128, 128, 128, 255]);

        let mut empty = [0u8; 4];
        blend_over(&mut empty, [10, 20, 30, 255], 1.0);
        assert_eq!(empty, [10, 20, 30, 255]);
    }
}
