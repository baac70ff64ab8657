//! Export request – what the caller asks the pipeline to produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::units::{PageOrientation, PaperSize};

/// Output format. Dispatched through an exhaustive `match` in
/// [`crate::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    RasterPng,
    RasterJpeg,
    VectorSvg,
    PrintDocument,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::RasterPng,
        ExportFormat::RasterJpeg,
        ExportFormat::VectorSvg,
        ExportFormat::PrintDocument,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::RasterPng => "image/png",
            ExportFormat::RasterJpeg => "image/jpeg",
            ExportFormat::VectorSvg => "image/svg+xml",
            ExportFormat::PrintDocument => "application/pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::RasterPng => "png",
            ExportFormat::RasterJpeg => "jpg",
            ExportFormat::VectorSvg => "svg",
            ExportFormat::PrintDocument => "pdf",
        }
    }

    pub fn is_raster(self) -> bool {
        matches!(self, ExportFormat::RasterPng | ExportFormat::RasterJpeg)
    }

    /// Formats that produce one image rather than a paged document.
    pub fn is_single_image(self) -> bool {
        !matches!(self, ExportFormat::PrintDocument)
    }

    /// Whether the encoded output can carry an alpha channel.
    pub fn supports_alpha(self) -> bool {
        matches!(self, ExportFormat::RasterPng | ExportFormat::VectorSvg)
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::RasterPng => "raster-png",
            ExportFormat::RasterJpeg => "raster-jpeg",
            ExportFormat::VectorSvg => "vector-svg",
            ExportFormat::PrintDocument => "print-document",
        };
        f.write_str(name)
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "raster-png" => Ok(ExportFormat::RasterPng),
            "jpg" | "jpeg" | "raster-jpeg" => Ok(ExportFormat::RasterJpeg),
            "svg" | "vector-svg" => Ok(ExportFormat::VectorSvg),
            "pdf" | "print-document" => Ok(ExportFormat::PrintDocument),
            other => Err(ExportError::invalid(format!("unsupported format '{other}'"))),
        }
    }
}

/// Output quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Screen,
    Print,
    Press,
}

impl QualityTier {
    pub fn dpi(self) -> u32 {
        match self {
            QualityTier::Screen => 72,
            QualityTier::Print | QualityTier::Press => 300,
        }
    }
}

impl FromStr for QualityTier {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screen" => Ok(QualityTier::Screen),
            "print" => Ok(QualityTier::Print),
            "press" => Ok(QualityTier::Press),
            other => Err(ExportError::invalid(format!("unknown quality tier '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorProfile {
    #[default]
    Srgb,
    AdobeRgb,
    Cmyk,
}

impl FromStr for ColorProfile {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "srgb" => Ok(ColorProfile::Srgb),
            "adobergb" | "adobe-rgb" => Ok(ColorProfile::AdobeRgb),
            "cmyk" => Ok(ColorProfile::Cmyk),
            other => Err(ExportError::invalid(format!("unknown color profile '{other}'"))),
        }
    }
}

/// Which pages to export. Explicit lists are 1-based page numbers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSelection {
    All,
    #[default]
    Current,
    Pages(Vec<u32>),
}

impl PageSelection {
    /// Resolve to an ordered list of 0-based page indices.
    ///
    /// Duplicates in an explicit list are kept: each entry produces a page.
    pub fn resolve(&self, page_count: u32, current: u32) -> Result<Vec<u32>> {
        if page_count == 0 {
            return Err(ExportError::invalid("document has no pages"));
        }
        match self {
            PageSelection::All => Ok((0..page_count).collect()),
            PageSelection::Current => {
                if current >= page_count {
                    return Err(ExportError::invalid(format!(
                        "current page {} is outside the document ({} pages)",
                        current + 1,
                        page_count
                    )));
                }
                Ok(vec![current])
            }
            PageSelection::Pages(pages) => {
                if pages.is_empty() {
                    return Err(ExportError::invalid("page selection is empty"));
                }
                pages
                    .iter()
                    .map(|&p| {
                        if p == 0 || p > page_count {
                            Err(ExportError::invalid(format!(
                                "page {p} is out of range (document has {page_count} pages)"
                            )))
                        } else {
                            Ok(p - 1)
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Most pages a parsed selection may list.
pub const MAX_SELECTED_PAGES: usize = 10_000;

fn too_many() -> ExportError {
    ExportError::invalid(format!("page selection lists more than {MAX_SELECTED_PAGES} pages"))
}

impl FromStr for PageSelection {
    type Err = ExportError;

    /// `all`, `current`, or a list such as `1,3,5-7`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "all" => return Ok(PageSelection::All),
            "current" => return Ok(PageSelection::Current),
            _ => {}
        }

        let mut pages = Vec::new();
        for part in trimmed.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let bad = || ExportError::invalid(format!("bad page selection '{part}'"));
            if let Some((start, end)) = part.split_once('-') {
                let start: u32 = start.trim().parse().map_err(|_| bad())?;
                let end: u32 = end.trim().parse().map_err(|_| bad())?;
                if start > end {
                    return Err(bad());
                }
                let room = MAX_SELECTED_PAGES - pages.len();
                if (end - start) as usize >= room {
                    return Err(too_many());
                }
                pages.extend(start..=end);
            } else {
                if pages.len() >= MAX_SELECTED_PAGES {
                    return Err(too_many());
                }
                pages.push(part.parse().map_err(|_| bad())?);
            }
        }
        if pages.is_empty() {
            return Err(ExportError::invalid("page selection is empty"));
        }
        Ok(PageSelection::Pages(pages))
    }
}

/// A complete export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportRequest {
    pub format: ExportFormat,
    pub quality: QualityTier,
    pub paper_size: PaperSize,
    pub orientation: PageOrientation,
    /// Bleed margin in millimetres, added on every side of the trim box.
    pub bleed_mm: f64,
    pub crop_marks: bool,
    pub safe_zone: bool,
    /// Honoured for PNG only; JPEG has no alpha channel.
    pub transparent_background: bool,
    pub color_profile: ColorProfile,
    pub page_selection: PageSelection,
    /// When false, pages other than the current one are rendered with
    /// template/background content only.
    pub multi_page_include_user_objects: bool,
}

impl Default for ExportRequest {
    fn default() -> Self {
        Self {
            format: ExportFormat::RasterPng,
            quality: QualityTier::Screen,
            paper_size: PaperSize::A4,
            orientation: PageOrientation::Portrait,
            bleed_mm: 0.0,
            crop_marks: false,
            safe_zone: false,
            transparent_background: false,
            color_profile: ColorProfile::Srgb,
            page_selection: PageSelection::Current,
            multi_page_include_user_objects: true,
        }
    }
}

impl ExportRequest {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Self::default()
        }
    }

    /// A print-ready PDF request for `paper` with the given bleed.
    pub fn print_document(paper: PaperSize, bleed_mm: f64) -> Self {
        Self {
            format: ExportFormat::PrintDocument,
            quality: QualityTier::Print,
            paper_size: paper,
            bleed_mm,
            crop_marks: true,
            page_selection: PageSelection::All,
            ..Self::default()
        }
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_paper(mut self, paper: PaperSize, orientation: PageOrientation) -> Self {
        self.paper_size = paper;
        self.orientation = orientation;
        self
    }

    pub fn with_bleed(mut self, bleed_mm: f64) -> Self {
        self.bleed_mm = bleed_mm;
        self
    }

    pub fn with_marks(mut self, crop_marks: bool, safe_zone: bool) -> Self {
        self.crop_marks = crop_marks;
        self.safe_zone = safe_zone;
        self
    }

    pub fn with_transparent_background(mut self, transparent: bool) -> Self {
        self.transparent_background = transparent;
        self
    }

    pub fn with_color_profile(mut self, profile: ColorProfile) -> Self {
        self.color_profile = profile;
        self
    }

    pub fn with_pages(mut self, selection: PageSelection) -> Self {
        self.page_selection = selection;
        self
    }

    /// Deserialise from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExportError::invalid(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_tiers_map_to_dpi() {
        assert_eq!(QualityTier::Screen.dpi(), 72);
        assert_eq!(QualityTier::Print.dpi(), 300);
        assert_eq!(QualityTier::Press.dpi(), 300);
    }

    #[test]
    fn explicit_pages_resolve_in_order_with_duplicates() {
        let sel = PageSelection::Pages(vec![3, 1, 3]);
        assert_eq!(sel.resolve(4, 0).unwrap(), vec![2, 0, 2]);
    }

    #[test]
    fn out_of_range_pages_are_invalid() {
        let err = PageSelection::Pages(vec![0]).resolve(4, 0).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
        let err = PageSelection::Pages(vec![5]).resolve(4, 0).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
        let err = PageSelection::Pages(vec![]).resolve(4, 0).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
    }

    #[test]
    fn all_and_current() {
        assert_eq!(PageSelection::All.resolve(3, 1).unwrap(), vec![0, 1, 2]);
        assert_eq!(PageSelection::Current.resolve(3, 1).unwrap(), vec![1]);
        assert!(PageSelection::All.resolve(0, 0).is_err());
    }

    #[test]
    fn page_selection_parsing() {
        assert_eq!("all".parse::<PageSelection>().unwrap(), PageSelection::All);
        assert_eq!(
            "1,3,5-7".parse::<PageSelection>().unwrap(),
            PageSelection::Pages(vec![1, 3, 5, 6, 7])
        );
        assert!("7-5".parse::<PageSelection>().is_err());
        assert!("x".parse::<PageSelection>().is_err());
    }

    #[test]
    fn huge_page_ranges_are_rejected_before_expansion() {
        let err = "1-50000000".parse::<PageSelection>().unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
        assert!("1-4294967295".parse::<PageSelection>().is_err());
        assert!("1-6000,7000-12000".parse::<PageSelection>().is_err());

        let limit = format!("1-{MAX_SELECTED_PAGES}");
        match limit.parse::<PageSelection>().unwrap() {
            PageSelection::Pages(pages) => assert_eq!(pages.len(), MAX_SELECTED_PAGES),
            other => panic!("unexpected {other:?}"),
        }
        assert!(format!("{limit},1").parse::<PageSelection>().is_err());
    }

    #[test]
    fn unknown_format_is_invalid_configuration() {
        let err = "tiff".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
        let err = ExportRequest::from_json(r#"{"format": "raster-tiff"}"#).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let req = ExportRequest::from_json(
            r#"{"format": "print-document", "bleed_mm": 3.0, "paper_size": "letter",
                "page_selection": {"pages": [1, 2]}}"#,
        )
        .unwrap();
        assert_eq!(req.format, ExportFormat::PrintDocument);
        assert_eq!(req.paper_size, PaperSize::Letter);
        assert_eq!(req.page_selection, PageSelection::Pages(vec![1, 2]));
        assert_eq!(req.quality, QualityTier::Screen);
        assert!(req.multi_page_include_user_objects);
    }

    #[test]
    fn custom_paper_json() {
        let req = ExportRequest::from_json(
            r#"{"paper_size": {"custom": {"width": 5, "height": 7, "unit": "in"}}}"#,
        )
        .unwrap();
        assert!(req.paper_size.is_custom());
    }
}
