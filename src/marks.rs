//! Printer's marks – crop marks and the safe-zone guide as vector geometry.
//!
//! Coordinates are millimetres in bleed-box space: origin at the top-left
//! corner of the bleed box, y growing downwards. The trim box therefore
//! starts at `(bleed, bleed)`. Crop marks sit outside the trim box and may
//! have negative coordinates when the bleed is narrower than the marks;
//! the PDF backend adds a slug area for them (see [`slug_mm`]).

use serde::{Deserialize, Serialize};

use crate::units::PaperGeometry;

pub const CROP_MARK_LENGTH_MM: f64 = 5.0;
pub const CROP_MARK_OFFSET_MM: f64 = 2.0;
pub const SAFE_MARGIN_MM: f64 = 5.0;
pub const SAFE_ZONE_DASH_MM: f64 = 2.0;
pub const SAFE_ZONE_GAP_MM: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkPoint {
    pub x: f64,
    pub y: f64,
}

impl MarkPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// What a primitive is for; backends pick stroke colours from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Crop,
    SafeZone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarkPrimitive {
    Segment {
        kind: MarkKind,
        from: MarkPoint,
        to: MarkPoint,
    },
    DashedRect {
        kind: MarkKind,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        dash: f64,
        gap: f64,
    },
}

impl MarkPrimitive {
    pub fn kind(&self) -> MarkKind {
        match self {
            MarkPrimitive::Segment { kind, .. } | MarkPrimitive::DashedRect { kind, .. } => *kind,
        }
    }

    /// Flatten into straight segments (dashed rectangles become their dashes).
    pub fn segments(&self) -> Vec<(MarkPoint, MarkPoint)> {
        match *self {
            MarkPrimitive::Segment { from, to, .. } => vec![(from, to)],
            MarkPrimitive::DashedRect {
                x,
                y,
                width,
                height,
                dash,
                gap,
                ..
            } => {
                let corners = [
                    MarkPoint::new(x, y),
                    MarkPoint::new(x + width, y),
                    MarkPoint::new(x + width, y + height),
                    MarkPoint::new(x, y + height),
                ];
                let mut out = Vec::new();
                for i in 0..4 {
                    dash_line(corners[i], corners[(i + 1) % 4], dash, gap, &mut out);
                }
                out
            }
        }
    }
}

fn dash_line(from: MarkPoint, to: MarkPoint, dash: f64, gap: f64, out: &mut Vec<(MarkPoint, MarkPoint)>) {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= 0.0 {
        return;
    }
    if dash <= 0.0 || gap <= 0.0 {
        out.push((from, to));
        return;
    }
    let (ux, uy) = (dx / len, dy / len);
    let mut t = 0.0;
    while t < len {
        let end = (t + dash).min(len);
        out.push((
            MarkPoint::new(from.x + ux * t, from.y + uy * t),
            MarkPoint::new(from.x + ux * end, from.y + uy * end),
        ));
        t += dash + gap;
    }
}

/// The eight crop-mark segments, two per trim corner.
///
/// Each segment is `CROP_MARK_LENGTH_MM` long and stops
/// `CROP_MARK_OFFSET_MM` short of the trim edge, so marks never intrude on
/// the trim box whatever the bleed.
pub fn crop_marks(geometry: &PaperGeometry) -> Vec<MarkPrimitive> {
    let b = geometry.bleed_mm;
    let left = b;
    let top = b;
    let right = b + geometry.trim_width_mm;
    let bottom = b + geometry.trim_height_mm;
    let near = CROP_MARK_OFFSET_MM;
    let far = CROP_MARK_OFFSET_MM + CROP_MARK_LENGTH_MM;

    let seg = |x1, y1, x2, y2| MarkPrimitive::Segment {
        kind: MarkKind::Crop,
        from: MarkPoint::new(x1, y1),
        to: MarkPoint::new(x2, y2),
    };

    vec![
        // top-left
        seg(left - far, top, left - near, top),
        seg(left, top - far, left, top - near),
        // top-right
        seg(right + near, top, right + far, top),
        seg(right, top - far, right, top - near),
        // bottom-left
        seg(left - far, bottom, left - near, bottom),
        seg(left, bottom + near, left, bottom + far),
        // bottom-right
        seg(right + near, bottom, right + far, bottom),
        seg(right, bottom + near, right, bottom + far),
    ]
}

/// Dashed guide inset `SAFE_MARGIN_MM` from each trim edge, or `None` when
/// the trim box is too small to hold it.
pub fn safe_zone(geometry: &PaperGeometry) -> Option<MarkPrimitive> {
    let width = geometry.trim_width_mm - 2.0 * SAFE_MARGIN_MM;
    let height = geometry.trim_height_mm - 2.0 * SAFE_MARGIN_MM;
    if width <= 0.0 || height <= 0.0 {
        log::warn!(
            "trim box {:.1}×{:.1} mm too small for a {SAFE_MARGIN_MM} mm safe zone",
            geometry.trim_width_mm,
            geometry.trim_height_mm
        );
        return None;
    }
    Some(MarkPrimitive::DashedRect {
        kind: MarkKind::SafeZone,
        x: geometry.bleed_mm + SAFE_MARGIN_MM,
        y: geometry.bleed_mm + SAFE_MARGIN_MM,
        width,
        height,
        dash: SAFE_ZONE_DASH_MM,
        gap: SAFE_ZONE_GAP_MM,
    })
}

/// All marks requested for a page, in drawing order.
pub fn render_marks(geometry: &PaperGeometry, crop: bool, safe: bool) -> Vec<MarkPrimitive> {
    let mut marks = Vec::new();
    if safe {
        marks.extend(safe_zone(geometry));
    }
    if crop {
        marks.extend(crop_marks(geometry));
    }
    marks
}

/// Extra sheet margin outside the bleed box needed to hold the crop marks.
pub fn slug_mm(geometry: &PaperGeometry, crop: bool) -> f64 {
    if crop {
        (CROP_MARK_OFFSET_MM + CROP_MARK_LENGTH_MM - geometry.bleed_mm).max(0.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(bleed: f64) -> PaperGeometry {
        PaperGeometry {
            trim_width_mm: 210.0,
            trim_height_mm: 297.0,
            bleed_mm: bleed,
            dpi: 300,
            pixel_width: 1,
            pixel_height: 1,
        }
    }

    fn outside_trim(p: MarkPoint, g: &PaperGeometry) -> bool {
        let b = g.bleed_mm;
        p.x < b || p.y < b || p.x > b + g.trim_width_mm || p.y > b + g.trim_height_mm
    }

    #[test]
    fn zero_bleed_marks_stay_outside_trim_at_offset() {
        let g = geometry(0.0);
        let marks = crop_marks(&g);
        assert_eq!(marks.len(), 8);
        for mark in &marks {
            for (from, to) in mark.segments() {
                let len = ((to.x - from.x).powi(2) + (to.y - from.y).powi(2)).sqrt();
                assert!((len - CROP_MARK_LENGTH_MM).abs() < 1e-9);
                // Both ends lie outside the trim box; the inner one exactly
                // CROP_MARK_OFFSET_MM away from the trim edge.
                let inner = [from, to]
                    .iter()
                    .map(|p| {
                        let dx = if p.x < 0.0 { -p.x } else if p.x > 210.0 { p.x - 210.0 } else { 0.0 };
                        let dy = if p.y < 0.0 { -p.y } else if p.y > 297.0 { p.y - 297.0 } else { 0.0 };
                        dx.max(dy)
                    })
                    .fold(f64::INFINITY, f64::min);
                assert!((inner - CROP_MARK_OFFSET_MM).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn top_left_mark_starts_at_bleed_minus_offset_minus_length() {
        let g = geometry(3.0);
        match &crop_marks(&g)[0] {
            MarkPrimitive::Segment { from, to, .. } => {
                assert!((from.x - (3.0 - 2.0 - 5.0)).abs() < 1e-9);
                assert!((to.x - 1.0).abs() < 1e-9);
                assert_eq!(from.y, 3.0);
            }
            other => panic!("unexpected primitive {other:?}"),
        }
    }

    #[test]
    fn crop_marks_never_enter_trim_box() {
        for bleed in [0.0, 3.0, 10.0] {
            let g = geometry(bleed);
            for mark in crop_marks(&g) {
                for (from, to) in mark.segments() {
                    assert!(outside_trim(from, &g) || outside_trim(to, &g));
                }
            }
        }
    }

    #[test]
    fn safe_zone_is_inset_from_trim() {
        let g = geometry(3.0);
        match safe_zone(&g).unwrap() {
            MarkPrimitive::DashedRect { x, y, width, height, .. } => {
                assert_eq!((x, y), (8.0, 8.0));
                assert_eq!((width, height), (200.0, 287.0));
            }
            other => panic!("unexpected primitive {other:?}"),
        }
    }

    #[test]
    fn marks_respect_flags() {
        let g = geometry(3.0);
        assert!(render_marks(&g, false, false).is_empty());
        assert_eq!(render_marks(&g, true, false).len(), 8);
        assert_eq!(render_marks(&g, false, true).len(), 1);
        assert_eq!(render_marks(&g, true, true).len(), 9);
    }

    #[test]
    fn slug_only_covers_what_bleed_does_not() {
        assert_eq!(slug_mm(&geometry(0.0), true), 7.0);
        assert_eq!(slug_mm(&geometry(3.0), true), 4.0);
        assert_eq!(slug_mm(&geometry(10.0), true), 0.0);
        assert_eq!(slug_mm(&geometry(0.0), false), 0.0);
    }

    #[test]
    fn dashed_rect_expands_into_short_segments() {
        let rect = MarkPrimitive::DashedRect {
            kind: MarkKind::SafeZone,
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            dash: 2.0,
            gap: 1.5,
        };
        let segs = rect.segments();
        // ceil(10 / 3.5) = 3 dashes per side
        assert_eq!(segs.len(), 12);
        for (a, b) in segs {
            let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
            assert!(len <= 2.0 + 1e-9);
        }
    }
}
