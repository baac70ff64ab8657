//! Print layout – the frozen description of a print document between page
//! selection and PDF emission. It records where each page's raster sits on
//! the sheet and which marks are drawn over it, so a document's structure
//! can be inspected (or logged as JSON) without parsing PDF bytes.

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::marks::{render_marks, slug_mm, MarkPrimitive};
use crate::request::{ColorProfile, ExportRequest};
use crate::units::{PaperGeometry, PT_PER_MM};

/// A complete print document layout ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintLayout {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "PrintLayout::default_title")]
    pub title: String,
    /// Shared geometry; every page has the same trim, bleed and pixel size.
    pub geometry: PaperGeometry,
    /// Margin outside the bleed box that holds the crop marks.
    pub slug_mm: f64,
    pub color_profile: ColorProfile,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One output page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// 0-based source page index.
    pub page_index: u32,
    pub image: ImagePlacement,
    /// Vector overlay in bleed-box millimetres.
    pub marks: Vec<MarkPrimitive>,
}

/// Where the page raster goes, in millimetres from the sheet's top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePlacement {
    pub x_mm: f64,
    pub y_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl PrintLayout {
    fn default_title() -> String {
        "print-forge document".to_string()
    }

    /// Lay out `pages` (0-based, in output order) for `request`.
    pub fn build(geometry: &PaperGeometry, request: &ExportRequest, pages: &[u32], title: &str) -> Self {
        let slug = slug_mm(geometry, request.crop_marks);
        let marks = render_marks(geometry, request.crop_marks, request.safe_zone);
        let image = ImagePlacement {
            x_mm: slug,
            y_mm: slug,
            width_mm: geometry.bleed_width_mm(),
            height_mm: geometry.bleed_height_mm(),
            pixel_width: geometry.pixel_width,
            pixel_height: geometry.pixel_height,
        };
        Self {
            title: title.to_string(),
            geometry: *geometry,
            slug_mm: slug,
            color_profile: request.color_profile,
            pages: pages
                .iter()
                .map(|&page_index| PageLayout {
                    page_index,
                    image,
                    marks: marks.clone(),
                })
                .collect(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Sheet width: bleed box plus slug on both sides.
    pub fn media_width_mm(&self) -> f64 {
        self.geometry.bleed_width_mm() + 2.0 * self.slug_mm
    }

    pub fn media_height_mm(&self) -> f64 {
        self.geometry.bleed_height_mm() + 2.0 * self.slug_mm
    }

    pub fn media_height_pt(&self) -> f64 {
        self.media_height_mm() * PT_PER_MM
    }

    /// Map a bleed-box point (mm, y down) to PDF user space (pt, y up).
    pub fn to_pdf_point(&self, x_mm: f64, y_mm: f64) -> (f64, f64) {
        let x = (self.slug_mm + x_mm) * PT_PER_MM;
        let y = self.media_height_pt() - (self.slug_mm + y_mm) * PT_PER_MM;
        (x, y)
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExportError::invalid(e.to_string()))
    }
}
