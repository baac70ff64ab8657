//! Unit geometry – millimetre / inch / point / pixel conversions and paper
//! resolution.
//!
//! Everything here is pure and deterministic: the same request always
//! resolves to the same [`PaperGeometry`], which is what makes print proofs
//! reproducible.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::request::ExportRequest;

pub const MM_PER_INCH: f64 = 25.4;
pub const PT_PER_INCH: f64 = 72.0;
/// 1 mm in PDF points.
pub const PT_PER_MM: f64 = PT_PER_INCH / MM_PER_INCH;

/// Largest pixel edge we agree to allocate for a single page.
pub const MAX_PIXEL_DIMENSION: u32 = 20_000;

/// `round(mm / 25.4 * dpi)`.
pub fn mm_to_pixels(mm: f64, dpi: u32) -> u32 {
    let px = (mm / MM_PER_INCH * dpi as f64).round();
    if px <= 0.0 {
        0
    } else if px >= u32::MAX as f64 {
        u32::MAX
    } else {
        px as u32
    }
}

pub fn mm_to_pt(mm: f64) -> f64 {
    mm * PT_PER_MM
}

pub fn inches_to_mm(inches: f64) -> f64 {
    inches * MM_PER_INCH
}

/// Page orientation. Landscape swaps the named size's width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

impl FromStr for PageOrientation {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(PageOrientation::Portrait),
            "landscape" => Ok(PageOrientation::Landscape),
            other => Err(ExportError::invalid(format!("unknown orientation '{other}'"))),
        }
    }
}

/// Unit used by custom paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    #[default]
    Mm,
    Cm,
    In,
    Pt,
}

impl LengthUnit {
    pub fn to_mm(self, value: f64) -> f64 {
        match self {
            LengthUnit::Mm => value,
            LengthUnit::Cm => value * 10.0,
            LengthUnit::In => inches_to_mm(value),
            LengthUnit::Pt => value / PT_PER_MM,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            LengthUnit::Mm => "mm",
            LengthUnit::Cm => "cm",
            LengthUnit::In => "in",
            LengthUnit::Pt => "pt",
        }
    }
}

/// Paper size: a named sheet or a custom width × height.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperSize {
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Custom {
        width: f64,
        height: f64,
        #[serde(default)]
        unit: LengthUnit,
    },
}

impl PaperSize {
    /// Portrait dimensions in millimetres, before orientation is applied.
    pub fn portrait_mm(&self) -> (f64, f64) {
        match *self {
            PaperSize::A2 => (420.0, 594.0),
            PaperSize::A3 => (297.0, 420.0),
            PaperSize::A4 => (210.0, 297.0),
            PaperSize::A5 => (148.0, 210.0),
            PaperSize::A6 => (105.0, 148.0),
            PaperSize::Letter => (inches_to_mm(8.5), inches_to_mm(11.0)),
            PaperSize::Legal => (inches_to_mm(8.5), inches_to_mm(14.0)),
            PaperSize::Tabloid => (inches_to_mm(11.0), inches_to_mm(17.0)),
            PaperSize::Custom {
                width,
                height,
                unit,
            } => (unit.to_mm(width), unit.to_mm(height)),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, PaperSize::Custom { .. })
    }
}

impl fmt::Display for PaperSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaperSize::A2 => f.write_str("a2"),
            PaperSize::A3 => f.write_str("a3"),
            PaperSize::A4 => f.write_str("a4"),
            PaperSize::A5 => f.write_str("a5"),
            PaperSize::A6 => f.write_str("a6"),
            PaperSize::Letter => f.write_str("letter"),
            PaperSize::Legal => f.write_str("legal"),
            PaperSize::Tabloid => f.write_str("tabloid"),
            PaperSize::Custom {
                width,
                height,
                unit,
            } => write!(f, "{width}x{height}{}", unit.suffix()),
        }
    }
}

impl FromStr for PaperSize {
    type Err = ExportError;

    /// Accepts a name (`a4`, `letter`, ...) or `<w>x<h><unit>` such as
    /// `210x297mm` or `8.5x11in`. A bare `<w>x<h>` is millimetres.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let named = match lower.as_str() {
            "a2" => Some(PaperSize::A2),
            "a3" => Some(PaperSize::A3),
            "a4" => Some(PaperSize::A4),
            "a5" => Some(PaperSize::A5),
            "a6" => Some(PaperSize::A6),
            "letter" => Some(PaperSize::Letter),
            "legal" => Some(PaperSize::Legal),
            "tabloid" => Some(PaperSize::Tabloid),
            _ => None,
        };
        if let Some(size) = named {
            return Ok(size);
        }

        let (dims, unit) = [
            ("mm", LengthUnit::Mm),
            ("cm", LengthUnit::Cm),
            ("in", LengthUnit::In),
            ("pt", LengthUnit::Pt),
        ]
        .iter()
        .find_map(|(suffix, unit)| lower.strip_suffix(suffix).map(|d| (d, *unit)))
        .unwrap_or((lower.as_str(), LengthUnit::Mm));

        let (w, h) = dims
            .split_once('x')
            .ok_or_else(|| ExportError::invalid(format!("unknown paper size '{s}'")))?;
        let width: f64 = w
            .trim()
            .parse()
            .map_err(|_| ExportError::invalid(format!("bad paper width in '{s}'")))?;
        let height: f64 = h
            .trim()
            .parse()
            .map_err(|_| ExportError::invalid(format!("bad paper height in '{s}'")))?;
        Ok(PaperSize::Custom {
            width,
            height,
            unit,
        })
    }
}

/// Resolve `(width_mm, height_mm)` for a paper size and orientation.
///
/// Named sizes swap to `(h, w)` in landscape; custom sizes pass through
/// unchanged, already in the caller's intended orientation.
pub fn resolve_paper_dimensions(paper: &PaperSize, orientation: PageOrientation) -> (f64, f64) {
    let (w, h) = paper.portrait_mm();
    if paper.is_custom() {
        return (w, h);
    }
    match orientation {
        PageOrientation::Portrait => (w, h),
        PageOrientation::Landscape => (h, w),
    }
}

/// Fully resolved physical and pixel geometry for one export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperGeometry {
    pub trim_width_mm: f64,
    pub trim_height_mm: f64,
    pub bleed_mm: f64,
    pub dpi: u32,
    /// `mm_to_pixels(trim_width_mm + 2·bleed_mm, dpi)`.
    pub pixel_width: u32,
    /// `mm_to_pixels(trim_height_mm + 2·bleed_mm, dpi)`.
    pub pixel_height: u32,
}

impl PaperGeometry {
    pub fn bleed_width_mm(&self) -> f64 {
        self.trim_width_mm + 2.0 * self.bleed_mm
    }

    pub fn bleed_height_mm(&self) -> f64 {
        self.trim_height_mm + 2.0 * self.bleed_mm
    }

    /// Ratio between the target DPI and the 72-DPI document coordinate space.
    pub fn pixel_ratio(&self) -> f64 {
        self.dpi as f64 / PT_PER_INCH
    }
}

/// Resolve the [`PaperGeometry`] for a request.
pub fn resolve_geometry(request: &ExportRequest) -> Result<PaperGeometry> {
    let bleed = request.bleed_mm;
    if !bleed.is_finite() || bleed < 0.0 {
        return Err(ExportError::invalid(format!(
            "bleed must be a finite, non-negative length (got {bleed} mm)"
        )));
    }

    let (trim_w, trim_h) = resolve_paper_dimensions(&request.paper_size, request.orientation);
    if !(trim_w.is_finite() && trim_h.is_finite()) || trim_w <= 0.0 || trim_h <= 0.0 {
        return Err(ExportError::invalid(format!(
            "paper size {} resolves to {trim_w} × {trim_h} mm",
            request.paper_size
        )));
    }

    let dpi = request.quality.dpi();
    let pixel_width = mm_to_pixels(trim_w + 2.0 * bleed, dpi);
    let pixel_height = mm_to_pixels(trim_h + 2.0 * bleed, dpi);
    if pixel_width == 0 || pixel_height == 0 {
        return Err(ExportError::invalid(format!(
            "paper size {} is smaller than one pixel at {dpi} DPI",
            request.paper_size
        )));
    }
    if pixel_width > MAX_PIXEL_DIMENSION || pixel_height > MAX_PIXEL_DIMENSION {
        return Err(ExportError::invalid(format!(
            "{pixel_width} × {pixel_height} px exceeds the {MAX_PIXEL_DIMENSION} px page limit"
        )));
    }

    let geometry = PaperGeometry {
        trim_width_mm: trim_w,
        trim_height_mm: trim_h,
        bleed_mm: bleed,
        dpi,
        pixel_width,
        pixel_height,
    };
    log::debug!(
        "resolved geometry: trim {:.2}×{:.2} mm, bleed {:.2} mm, {} DPI → {}×{} px",
        trim_w,
        trim_h,
        bleed,
        dpi,
        pixel_width,
        pixel_height
    );
    Ok(geometry)
}
