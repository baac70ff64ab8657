//! Pixel painting on `image::RgbaImage`: anti-aliased polygon fill,
//! axis-aligned rectangles and source-over blending.

use image::{Rgba, RgbaImage};

/// Vertical sub-samples per pixel row for anti-aliasing.
const SUBSAMPLES: usize = 4;

/// A point in pixel space (y down).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A closed outline. The last point connects back to the first.
pub type Contour = Vec<Vec2>;

/// 2×3 affine transform: `x' = a·x + c·y + e`, `y' = b·x + d·y + f`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Affine {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            e: x,
            f: y,
            ..Self::IDENTITY
        }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    /// Rotation by `degrees` in y-down space: negative angles turn
    /// counter-clockwise on screen.
    pub fn rotate(degrees: f32) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        }
    }

    /// `self` first, then `next`.
    pub fn then(self, next: Affine) -> Affine {
        Affine {
            a: next.a * self.a + next.c * self.b,
            b: next.b * self.a + next.d * self.b,
            c: next.a * self.c + next.c * self.d,
            d: next.b * self.c + next.d * self.d,
            e: next.a * self.e + next.c * self.f + next.e,
            f: next.b * self.e + next.d * self.f + next.f,
        }
    }

    pub fn apply(&self, p: Vec2) -> Vec2 {
        Vec2 {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }
}

pub fn transform_contours(contours: &[Contour], t: &Affine) -> Vec<Contour> {
    contours
        .iter()
        .map(|c| c.iter().map(|p| t.apply(*p)).collect())
        .collect()
}

/// Blend `color` over `dst` with the given coverage (0..=1), source-over,
/// straight alpha.
pub fn blend(dst: &mut Rgba<u8>, color: [u8; 4], coverage: f32) {
    let sa = (color[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    if out_a <= 0.0 {
        return;
    }
    for i in 0..3 {
        let sc = color[i] as f32;
        let dc = dst[i] as f32;
        let c = (sc * sa + dc * da * (1.0 - sa)) / out_a;
        dst[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// Fill an axis-aligned rectangle (pixel units, fractional edges allowed).
///
/// Returns the number of pixels touched.
pub fn fill_rect(img: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, color: [u8; 4]) -> usize {
    let contour = vec![
        Vec2::new(x, y),
        Vec2::new(x + w, y),
        Vec2::new(x + w, y + h),
        Vec2::new(x, y + h),
    ];
    fill_contours(img, &[contour], color, 1.0)
}

struct Edge {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    winding: i32,
}

/// Fill closed contours with the non-zero winding rule.
///
/// Coverage is computed from `SUBSAMPLES` scanlines per pixel row with exact
/// horizontal span overlap. `opacity` multiplies the colour's own alpha.
/// Returns the number of pixels whose value was touched.
pub fn fill_contours(img: &mut RgbaImage, contours: &[Contour], color: [u8; 4], opacity: f32) -> usize {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || opacity <= 0.0 {
        return 0;
    }

    let mut edges = Vec::new();
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for contour in contours {
        if contour.len() < 3 {
            continue;
        }
        for i in 0..contour.len() {
            let p = contour[i];
            let q = contour[(i + 1) % contour.len()];
            if !(p.x.is_finite() && p.y.is_finite() && q.x.is_finite() && q.y.is_finite()) {
                continue;
            }
            if p.y == q.y {
                continue;
            }
            let (top, bottom, winding) = if p.y < q.y { (p, q, 1) } else { (q, p, -1) };
            min_y = min_y.min(top.y);
            max_y = max_y.max(bottom.y);
            edges.push(Edge {
                x0: top.x,
                y0: top.y,
                x1: bottom.x,
                y1: bottom.y,
                winding,
            });
        }
    }
    if edges.is_empty() {
        return 0;
    }

    let row_start = min_y.floor().max(0.0) as u32;
    let row_end = (max_y.ceil().max(0.0) as u32).min(height);
    let weight = 1.0 / SUBSAMPLES as f32;
    let mut coverage = vec![0.0f32; width as usize];
    let mut crossings: Vec<(f32, i32)> = Vec::new();
    let mut touched = 0usize;

    for py in row_start..row_end {
        coverage.iter_mut().for_each(|c| *c = 0.0);
        let mut span_min = width as usize;
        let mut span_max = 0usize;

        for s in 0..SUBSAMPLES {
            let sy = py as f32 + (s as f32 + 0.5) * weight;
            crossings.clear();
            for e in &edges {
                if sy >= e.y0 && sy < e.y1 {
                    let t = (sy - e.y0) / (e.y1 - e.y0);
                    crossings.push((e.x0 + t * (e.x1 - e.x0), e.winding));
                }
            }
            if crossings.len() < 2 {
                continue;
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            let mut span_start = 0.0f32;
            for &(x, w) in &crossings {
                let before = winding;
                winding += w;
                if before == 0 && winding != 0 {
                    span_start = x;
                } else if before != 0 && winding == 0 {
                    if let Some((lo, hi)) = accumulate_span(&mut coverage, span_start, x, weight) {
                        span_min = span_min.min(lo);
                        span_max = span_max.max(hi);
                    }
                }
            }
        }

        if span_min > span_max {
            continue;
        }
        for px in span_min..=span_max.min(width as usize - 1) {
            let c = coverage[px];
            if c > 0.0 {
                let pixel = img.get_pixel_mut(px as u32, py);
                blend(pixel, color, c.min(1.0) * opacity);
                touched += 1;
            }
        }
    }
    touched
}

/// Add `weight × overlap` to every pixel column the span `[x0, x1)` covers.
/// Returns the touched column range.
fn accumulate_span(coverage: &mut [f32], x0: f32, x1: f32, weight: f32) -> Option<(usize, usize)> {
    let width = coverage.len() as f32;
    let x0 = x0.max(0.0);
    let x1 = x1.min(width);
    if x1 <= x0 {
        return None;
    }
    let i0 = x0.floor() as usize;
    let i1 = x1.floor() as usize;
    if i0 == i1 {
        coverage[i0] += (x1 - x0) * weight;
        return Some((i0, i0));
    }
    coverage[i0] += (i0 as f32 + 1.0 - x0) * weight;
    for c in &mut coverage[i0 + 1..i1] {
        *c += weight;
    }
    let mut last = i1 - 1;
    if i1 < coverage.len() {
        let tail = x1 - i1 as f32;
        if tail > 0.0 {
            coverage[i1] += tail * weight;
            last = i1;
        }
    }
    Some((i0, last))
}

/// Flatten `img` over an opaque white background.
pub fn flatten_onto_white(img: &RgbaImage) -> image::RgbImage {
    let mut out = image::RgbImage::new(img.width(), img.height());
    for (src, dst) in img.pixels().zip(out.pixels_mut()) {
        let mut px = Rgba([255, 255, 255, 255]);
        blend(&mut px, src.0, 1.0);
        *dst = image::Rgb([px[0], px[1], px[2]]);
    }
    out
}

/// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(hex: &str) -> Option<[u8; 4]> {
    let hex = hex.trim().trim_start_matches('#');
    let byte = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let r = byte(&hex[0..1].repeat(2))?;
            let g = byte(&hex[1..2].repeat(2))?;
            let b = byte(&hex[2..3].repeat(2))?;
            Some([r, g, b, 255])
        }
        6 => Some([byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255]),
        8 => Some([
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
            byte(&hex[6..8])?,
        ]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pixel_rect_is_opaque() {
        let mut img = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let touched = fill_rect(&mut img, 2.0, 2.0, 4.0, 3.0, [0, 0, 0, 255]);
        assert_eq!(touched, 12);
        assert_eq!(img.get_pixel(2, 2).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(5, 4).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(6, 4).0, [255, 255, 255, 255]);
        assert_eq!(img.get_pixel(2, 5).0, [255, 255, 255, 255]);
    }

    #[test]
    fn half_covered_pixel_is_blended() {
        let mut img = RgbaImage::from_pixel(4, 1, Rgba([255, 255, 255, 255]));
        fill_rect(&mut img, 0.5, 0.0, 1.0, 1.0, [0, 0, 0, 255]);
        let p = img.get_pixel(0, 0).0;
        assert!(p[0] > 100 && p[0] < 160, "{p:?}");
    }

    #[test]
    fn opposite_winding_cancels() {
        let mut img = RgbaImage::new(8, 8);
        let outer = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(8.0, 0.0),
            Vec2::new(8.0, 8.0),
            Vec2::new(0.0, 8.0),
        ];
        let hole: Contour = outer.iter().rev().copied().collect();
        let touched = fill_contours(&mut img, &[outer, hole], [0, 0, 0, 255], 1.0);
        assert_eq!(touched, 0);
    }

    #[test]
    fn blend_over_transparent_keeps_source_colour() {
        let mut px = Rgba([0, 0, 0, 0]);
        blend(&mut px, [200, 100, 50, 255], 0.3);
        assert_eq!(&px.0[..3], &[200, 100, 50]);
        assert_eq!(px[3], 77);
    }

    #[test]
    fn rotation_is_counter_clockwise_for_negative_angles() {
        let p = Affine::rotate(-90.0).apply(Vec2::new(1.0, 0.0));
        assert!(p.x.abs() < 1e-6);
        assert!((p.y + 1.0).abs() < 1e-6, "expected (0,-1), got {p:?}");
    }

    #[test]
    fn then_composes_left_to_right() {
        let t = Affine::scale(2.0, 2.0).then(Affine::translate(5.0, 0.0));
        assert_eq!(t.apply(Vec2::new(1.0, 1.0)), Vec2::new(7.0, 2.0));
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#fff"), Some([255, 255, 255, 255]));
        assert_eq!(parse_hex_color("#1a365d"), Some([0x1a, 0x36, 0x5d, 255]));
        assert_eq!(parse_hex_color("00000080"), Some([0, 0, 0, 0x80]));
        assert_eq!(parse_hex_color("#zz0000"), None);
    }
}
