//! Watermark compositing for gated tiers.
//!
//! The mark is diagonal text centred on the raster, drawn at a fixed
//! opacity. When a tier requires it, a failure here fails the export: an
//! unmarked artifact is never returned in its place.

use crate::error::{ExportError, Result};
use crate::fonts::FontManager;
use crate::raster::{fill_contours, transform_contours, Affine};
use crate::surface::RasterPage;

pub const WATERMARK_OPACITY: f32 = 0.3;
pub const WATERMARK_ANGLE_DEG: f32 = -45.0;
/// Smallest watermark font size in pixels.
pub const MIN_FONT_SIZE_PX: f32 = 24.0;
pub const DEFAULT_WATERMARK_TEXT: &str = "PREVIEW";

const WATERMARK_COLOR: [u8; 4] = [96, 96, 96, 255];

/// Composites a translucent text mark onto raster pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    text: String,
    color: [u8; 4],
    opacity: f32,
    font_family: String,
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new(DEFAULT_WATERMARK_TEXT)
    }
}

impl Watermark {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: WATERMARK_COLOR,
            opacity: WATERMARK_OPACITY,
            font_family: "builtin".to_string(),
        }
    }

    pub fn with_font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = family.into();
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// `max(width / 20, 24)` pixels.
    pub fn font_size_for(width: u32) -> f32 {
        (width as f32 / 20.0).max(MIN_FONT_SIZE_PX)
    }

    /// Draw the mark into `page`, in place.
    ///
    /// Fails when the page is empty, the text has no drawable glyphs, or
    /// the mark ends up touching no pixel at all.
    pub fn apply(&self, page: &mut RasterPage, fonts: &FontManager) -> Result<()> {
        let (width, height) = (page.width(), page.height());
        if width == 0 || height == 0 {
            return Err(ExportError::WatermarkFailure(format!(
                "cannot watermark an empty {width}×{height} raster"
            )));
        }
        if self.text.trim().is_empty() {
            return Err(ExportError::WatermarkFailure("watermark text is empty".into()));
        }

        let font_size = Self::font_size_for(width);
        let outline = fonts.outline_text(&self.text, font_size, &self.font_family);
        if outline.is_empty() {
            return Err(ExportError::WatermarkFailure(format!(
                "no drawable glyphs in watermark text '{}'",
                self.text
            )));
        }
        if !outline.missing.is_empty() {
            let skipped: String = outline.missing.iter().collect();
            log::warn!(
                "watermark font '{}' has no glyphs for '{skipped}'; drawing the rest of '{}'",
                self.font_family,
                self.text
            );
        }

        let transform = Affine::translate(-outline.width / 2.0, -outline.height / 2.0)
            .then(Affine::rotate(WATERMARK_ANGLE_DEG))
            .then(Affine::translate(width as f32 / 2.0, height as f32 / 2.0));
        let contours = transform_contours(&outline.contours, &transform);

        let touched = fill_contours(page.pixels_mut(), &contours, self.color, self.opacity);
        if touched == 0 {
            return Err(ExportError::WatermarkFailure(format!(
                "watermark left no visible mark on a {width}×{height} raster"
            )));
        }
        log::debug!(
            "watermarked page {} ({} px at {:.0} px font)",
            page.page_index() + 1,
            touched,
            font_size
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn white_page(w: u32, h: u32) -> RasterPage {
        RasterPage::new(0, RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }

    #[test]
    fn font_size_scales_with_width_and_has_a_floor() {
        assert_eq!(Watermark::font_size_for(2000), 100.0);
        assert_eq!(Watermark::font_size_for(300), 24.0);
    }

    #[test]
    fn watermark_darkens_the_centre_of_the_page() {
        let fonts = FontManager::default();
        let mut page = white_page(600, 400);
        let before = page.clone();
        Watermark::default().apply(&mut page, &fonts).unwrap();
        assert_ne!(page, before);

        let changed = page
            .pixels()
            .pixels()
            .filter(|p| p.0 != [255, 255, 255, 255])
            .count();
        assert!(changed > 500, "only {changed} pixels changed");
        // Translucent: no pixel reaches the full mark colour.
        assert!(page.pixels().pixels().all(|p| p[0] > WATERMARK_COLOR[0]));
    }

    #[test]
    fn watermark_keeps_transparent_pixels_partially_transparent() {
        let fonts = FontManager::default();
        let mut page = RasterPage::new(0, RgbaImage::new(400, 400));
        Watermark::default().apply(&mut page, &fonts).unwrap();
        let max_alpha = page.pixels().pixels().map(|p| p[3]).max().unwrap_or(0);
        assert!(max_alpha > 0 && max_alpha <= 77, "{max_alpha}");
    }

    #[test]
    fn empty_inputs_fail_loudly() {
        let fonts = FontManager::default();
        let err = Watermark::default()
            .apply(&mut RasterPage::new(0, RgbaImage::new(0, 0)), &fonts)
            .unwrap_err();
        assert!(matches!(err, ExportError::WatermarkFailure(_)));

        let err = Watermark::new("   ").apply(&mut white_page(100, 100), &fonts).unwrap_err();
        assert!(matches!(err, ExportError::WatermarkFailure(_)));

        let err = Watermark::new("\u{2603}").apply(&mut white_page(100, 100), &fonts).unwrap_err();
        assert!(matches!(err, ExportError::WatermarkFailure(_)));
    }

    #[test]
    fn partly_drawable_text_still_marks_the_page() {
        let fonts = FontManager::default();
        let mut page = white_page(400, 300);
        Watermark::new("ÉBAUCHE").apply(&mut page, &fonts).unwrap();
        assert!(page.pixels().pixels().any(|p| p.0 != [255, 255, 255, 255]));
    }

    #[test]
    fn loaded_face_draws_a_different_mark() {
        let mut fonts = FontManager::default();
        fonts.load_font("Square", false, crate::fonts::square_glyph_font()).unwrap();

        let mut block = white_page(600, 400);
        Watermark::default().apply(&mut block, &fonts).unwrap();
        let mut face = white_page(600, 400);
        Watermark::default()
            .with_font_family(fonts.default_family())
            .apply(&mut face, &fonts)
            .unwrap();
        assert_ne!(block, face);
    }
}
