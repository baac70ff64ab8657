//! Scene documents – a small JSON page model that implements
//! [`RenderSurface`] and [`Personalize`].
//!
//! A scene is a list of pages sharing one coordinate space in points.
//! Elements are rectangles, single-line text and base64 data-URI images.
//! Elements flagged `template` belong to the page design (backgrounds,
//! frames, calendar grids); everything else is user content and can be
//! left out of a raster with `include_user_objects = false`.
//!
//! Rasters stretch the coordinate space onto the requested pixel size, so
//! a scene authored at the bleed-box size in points comes out undistorted.

use std::fmt::Write as _;

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::fonts::FontManager;
use crate::raster::{fill_contours, fill_rect, parse_hex_color, transform_contours, Affine};
use crate::surface::{
    BackgroundMode, Personalize, RasterPage, RasterRequest, RenderSurface, SurfaceError, TextField, TextPath,
};
use crate::units::MAX_PIXEL_DIMENSION;

/// Ascender used to place SVG text baselines, as a fraction of font size.
const SVG_ASCENT: f64 = 0.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDocument {
    #[serde(default)]
    pub title: Option<String>,
    /// Width of the coordinate space in points.
    pub width: f64,
    /// Height of the coordinate space in points.
    pub height: f64,
    /// 0-based page shown in the editor.
    #[serde(default)]
    pub current_page: u32,
    pub pages: Vec<ScenePage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenePage {
    /// Hex colour painted under everything on an opaque raster.
    #[serde(default = "ScenePage::default_background")]
    pub background: String,
    #[serde(default)]
    pub elements: Vec<SceneElement>,
}

impl ScenePage {
    fn default_background() -> String {
        "#ffffff".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SceneElement {
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: String,
        #[serde(default)]
        template: bool,
    },
    /// Single line of text; `(x, y)` is the anchor at the top of the line box.
    Text {
        x: f64,
        y: f64,
        text: String,
        #[serde(default = "SceneElement::default_font_size")]
        font_size: f64,
        #[serde(default = "SceneElement::default_color")]
        color: String,
        #[serde(default)]
        align: TextAlign,
        #[serde(default)]
        template: bool,
    },
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        /// `data:image/png;base64,...`
        src: String,
        #[serde(default)]
        template: bool,
    },
}

impl SceneElement {
    fn default_font_size() -> f64 {
        24.0
    }

    fn default_color() -> String {
        "#000000".to_string()
    }

    pub fn is_template(&self) -> bool {
        match self {
            SceneElement::Rect { template, .. }
            | SceneElement::Text { template, .. }
            | SceneElement::Image { template, .. } => *template,
        }
    }
}

impl SceneDocument {
    /// Parse and validate a scene.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: SceneDocument =
            serde_json::from_str(json).map_err(|e| ExportError::invalid(format!("bad scene document: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0 {
            return Err(ExportError::invalid(format!(
                "scene size must be positive, got {} × {}",
                self.width, self.height
            )));
        }
        if self.pages.is_empty() {
            return Err(ExportError::invalid("scene has no pages"));
        }
        if self.current_page as usize >= self.pages.len() {
            return Err(ExportError::invalid(format!(
                "current page {} is outside the scene ({} pages)",
                self.current_page + 1,
                self.pages.len()
            )));
        }
        Ok(())
    }

    fn page(&self, index: u32) -> std::result::Result<&ScenePage, SurfaceError> {
        self.pages
            .get(index as usize)
            .ok_or_else(|| SurfaceError::new(format!("page {} does not exist", index + 1)))
    }
}

fn color(hex: &str) -> std::result::Result<[u8; 4], SurfaceError> {
    parse_hex_color(hex).ok_or_else(|| SurfaceError::new(format!("invalid colour '{hex}'")))
}

/// Decode a base64 data URI into raw bytes.
/// Scaled image edge, in pixels, that is safe to resample into.
fn fits_raster_limit(px: f32) -> bool {
    px.is_finite() && px <= MAX_PIXEL_DIMENSION as f32
}

fn parse_data_uri(src: &str) -> std::result::Result<Vec<u8>, String> {
    if !src.starts_with("data:") {
        let preview: String = src.chars().take(80).collect();
        return Err(format!(
            "Image src must be a base64 data URI \
             (e.g. `data:image/png;base64,...`). Got: {preview:?}"
        ));
    }
    let rest = &src["data:".len()..];
    let comma_pos = rest
        .find(',')
        .ok_or_else(|| "Invalid data URI: missing `,` separator between header and data".to_string())?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported.".to_string());
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| format!("Base64 decode error: {e}"))
}

impl RenderSurface for SceneDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn current_page(&self) -> u32 {
        self.current_page
    }

    fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError> {
        self.page(index)?;
        self.current_page = index;
        Ok(())
    }

    fn rasterize(&mut self, request: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError> {
        let page = self.page(request.page_index)?;
        let (w, h) = (request.width, request.height);
        let sx = (w as f64 / self.width) as f32;
        let sy = (h as f64 / self.height) as f32;
        if !(sx.is_finite() && sy.is_finite()) {
            return Err(SurfaceError::new(format!(
                "cannot scale a {} × {} pt scene to {w}×{h} px",
                self.width, self.height
            )));
        }

        let mut img = match request.background {
            BackgroundMode::OpaqueWhite => {
                let mut img = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
                fill_rect(&mut img, 0.0, 0.0, w as f32, h as f32, color(&page.background)?);
                img
            }
            BackgroundMode::Transparent => RgbaImage::new(w, h),
        };
        let fonts = FontManager::default();

        for element in &page.elements {
            if !request.include_user_objects && !element.is_template() {
                continue;
            }
            match element {
                SceneElement::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                    ..
                } => {
                    fill_rect(
                        &mut img,
                        *x as f32 * sx,
                        *y as f32 * sy,
                        *width as f32 * sx,
                        *height as f32 * sy,
                        color(fill)?,
                    );
                }
                SceneElement::Text {
                    x,
                    y,
                    text,
                    font_size,
                    color: text_color,
                    align,
                    ..
                } => {
                    let outline = fonts.outline_text(text, *font_size as f32 * sy, "builtin");
                    if !outline.missing.is_empty() {
                        log::warn!(
                            "page {}: no glyphs for {:?} in '{text}'",
                            request.page_index + 1,
                            outline.missing
                        );
                    }
                    let anchor_x = *x as f32 * sx;
                    let left = match align {
                        TextAlign::Left => anchor_x,
                        TextAlign::Center => anchor_x - outline.width / 2.0,
                        TextAlign::Right => anchor_x - outline.width,
                    };
                    let contours = transform_contours(&outline.contours, &Affine::translate(left, *y as f32 * sy));
                    fill_contours(&mut img, &contours, color(text_color)?, 1.0);
                }
                SceneElement::Image {
                    x,
                    y,
                    width,
                    height,
                    src,
                    ..
                } => {
                    let (target_w, target_h) = ((*width as f32 * sx).round(), (*height as f32 * sy).round());
                    if !fits_raster_limit(target_w) || !fits_raster_limit(target_h) {
                        log::warn!(
                            "Skipping image on page {}: {target_w}×{target_h} px exceeds {MAX_PIXEL_DIMENSION} px",
                            request.page_index + 1
                        );
                        continue;
                    }
                    let decoded = parse_data_uri(src).and_then(|bytes| {
                        image::load_from_memory(&bytes).map_err(|e| format!("decode error: {e}"))
                    });
                    let source = match decoded {
                        Ok(img) => img.to_rgba8(),
                        Err(e) => {
                            log::warn!("Skipping image on page {}: {e}", request.page_index + 1);
                            continue;
                        }
                    };
                    let scaled = imageops::resize(
                        &source,
                        target_w.max(1.0) as u32,
                        target_h.max(1.0) as u32,
                        imageops::FilterType::Triangle,
                    );
                    imageops::overlay(
                        &mut img,
                        &scaled,
                        (*x as f32 * sx).round() as i64,
                        (*y as f32 * sy).round() as i64,
                    );
                }
            }
        }

        Ok(RasterPage::new(request.page_index, img))
    }

    fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError> {
        let page = self.page(self.current_page)?;
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height
        );
        let _ = write!(
            svg,
            r#"<rect width="100%" height="100%" fill="{}"/>"#,
            escape_xml(&page.background)
        );
        for element in &page.elements {
            match element {
                SceneElement::Rect {
                    x,
                    y,
                    width,
                    height,
                    fill,
                    ..
                } => {
                    let _ = write!(
                        svg,
                        r#"<rect x="{x}" y="{y}" width="{width}" height="{height}" fill="{}"/>"#,
                        escape_xml(fill)
                    );
                }
                SceneElement::Text {
                    x,
                    y,
                    text,
                    font_size,
                    color,
                    align,
                    ..
                } => {
                    let anchor = match align {
                        TextAlign::Left => "start",
                        TextAlign::Center => "middle",
                        TextAlign::Right => "end",
                    };
                    let _ = write!(
                        svg,
                        r#"<text x="{x}" y="{}" font-size="{font_size}" fill="{}" text-anchor="{anchor}">{}</text>"#,
                        y + font_size * SVG_ASCENT,
                        escape_xml(color),
                        escape_xml(text)
                    );
                }
                SceneElement::Image {
                    x,
                    y,
                    width,
                    height,
                    src,
                    ..
                } => {
                    let _ = write!(
                        svg,
                        r#"<image x="{x}" y="{y}" width="{width}" height="{height}" href="{}"/>"#,
                        escape_xml(src)
                    );
                }
            }
        }
        svg.push_str("</svg>");
        Ok(svg)
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

impl Personalize for SceneDocument {
    fn text_fields(&self) -> Vec<TextField> {
        let mut fields = Vec::new();
        for (p, page) in self.pages.iter().enumerate() {
            for (e, element) in page.elements.iter().enumerate() {
                if let SceneElement::Text { text, .. } = element {
                    fields.push(TextField {
                        path: TextPath(format!("/pages/{p}/elements/{e}/text")),
                        value: text.clone(),
                    });
                }
            }
        }
        fields
    }

    fn write_text(&mut self, path: &TextPath, value: String) -> std::result::Result<(), SurfaceError> {
        let bad_path = || SurfaceError::new(format!("no text property at {path}"));
        let parts: Vec<&str> = path.0.split('/').collect();
        let (p, e) = match parts.as_slice() {
            ["", "pages", p, "elements", e, "text"] => (
                p.parse::<usize>().map_err(|_| bad_path())?,
                e.parse::<usize>().map_err(|_| bad_path())?,
            ),
            _ => return Err(bad_path()),
        };
        match self.pages.get_mut(p).and_then(|page| page.elements.get_mut(e)) {
            Some(SceneElement::Text { text, .. }) => {
                *text = value;
                Ok(())
            }
            _ => Err(bad_path()),
        }
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::encode_png;

    fn two_pages() -> SceneDocument {
        SceneDocument::from_json(
            r##"{
                "title": "Test",
                "width": 100, "height": 50,
                "pages": [
                    {"background": "#ff0000", "elements": [
                        {"type": "rect", "x": 0, "y": 0, "width": 50, "height": 50, "fill": "#0000ff", "template": true},
                        {"type": "rect", "x": 50, "y": 0, "width": 50, "height": 50, "fill": "#00ff00"}
                    ]},
                    {"elements": [
                        {"type": "text", "x": 10, "y": 10, "text": "Hi {{name}} & <co>"}
                    ]}
                ]
            }"##,
        )
        .unwrap()
    }

    fn request(page_index: u32, background: BackgroundMode, include_user_objects: bool) -> RasterRequest {
        RasterRequest {
            page_index,
            width: 200,
            height: 100,
            pixel_ratio: 2.0,
            background,
            include_user_objects,
        }
    }

    #[test]
    fn raster_scales_to_target_and_honours_template_flag() {
        let mut doc = two_pages();
        let page = doc.rasterize(&request(0, BackgroundMode::OpaqueWhite, true)).unwrap();
        assert_eq!((page.width(), page.height()), (200, 100));
        assert_eq!(page.pixels().get_pixel(10, 10).0, [0, 0, 255, 255]);
        assert_eq!(page.pixels().get_pixel(150, 10).0, [0, 255, 0, 255]);

        let template_only = doc.rasterize(&request(0, BackgroundMode::OpaqueWhite, false)).unwrap();
        assert_eq!(template_only.pixels().get_pixel(10, 10).0, [0, 0, 255, 255]);
        assert_eq!(template_only.pixels().get_pixel(150, 10).0, [255, 0, 0, 255]);
    }

    #[test]
    fn transparent_mode_skips_page_background() {
        let mut doc = two_pages();
        let page = doc.rasterize(&request(1, BackgroundMode::Transparent, true)).unwrap();
        assert_eq!(page.pixels().get_pixel(199, 99).0, [0, 0, 0, 0]);
        assert!(page.pixels().pixels().any(|p| p[3] > 0), "text should be drawn");
    }

    #[test]
    fn rasterization_is_deterministic() {
        let mut doc = two_pages();
        let a = doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).unwrap();
        let b = doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn bad_colour_is_a_surface_error() {
        let mut doc = two_pages();
        doc.pages[0].background = "tomato".into();
        assert!(doc.rasterize(&request(0, BackgroundMode::OpaqueWhite, true)).is_err());
    }

    #[test]
    fn undecodable_images_are_skipped() {
        let mut doc = two_pages();
        doc.pages[1].elements.push(SceneElement::Image {
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            src: "https://example.invalid/logo.png".into(),
            template: false,
        });
        assert!(doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).is_ok());
    }

    #[test]
    fn data_uri_images_are_drawn() {
        let png = encode_png(&RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))).unwrap();
        let mut doc = two_pages();
        doc.pages[1].elements.push(SceneElement::Image {
            x: 50.0,
            y: 25.0,
            width: 10.0,
            height: 10.0,
            src: format!("data:image/png;base64,{}", BASE64_STD.encode(png)),
            template: false,
        });
        let page = doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).unwrap();
        assert_eq!(page.pixels().get_pixel(105, 55).0, [0, 0, 0, 255]);
    }

    #[test]
    fn oversized_images_are_skipped() {
        let png = encode_png(&RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))).unwrap();
        let mut doc = two_pages();
        let plain = doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).unwrap();
        doc.pages[1].elements.push(SceneElement::Image {
            x: 0.0,
            y: 0.0,
            width: 50_000.0,
            height: 50_000.0,
            src: format!("data:image/png;base64,{}", BASE64_STD.encode(png)),
            template: false,
        });
        let page = doc.rasterize(&request(1, BackgroundMode::OpaqueWhite, true)).unwrap();
        assert_eq!(page, plain);
    }

    #[test]
    fn unscalable_scene_size_is_a_surface_error() {
        let mut doc = SceneDocument::from_json(r#"{"width": 1e-300, "height": 10, "pages": [{}]}"#).unwrap();
        let err = doc.rasterize(&request(0, BackgroundMode::OpaqueWhite, true)).unwrap_err();
        assert!(err.to_string().contains("cannot scale"), "{err}");
    }

    #[test]
    fn svg_is_escaped_and_uses_document_space() {
        let mut doc = two_pages();
        doc.select_page(1).unwrap();
        let svg = doc.serialize_vector().unwrap();
        assert!(svg.contains(r#"viewBox="0 0 100 50""#));
        assert!(svg.contains("Hi {{name}} &amp; &lt;co&gt;"));
    }

    #[test]
    fn text_fields_round_trip_through_paths() {
        let mut doc = two_pages();
        let fields = doc.text_fields();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path.0, "/pages/1/elements/0/text");
        doc.write_text(&fields[0].path, "Hi Ada".into()).unwrap();
        assert_eq!(doc.text_fields()[0].value, "Hi Ada");
        assert!(doc.write_text(&TextPath("/pages/0/elements/0/text".into()), "x".into()).is_err());
        assert!(doc.write_text(&TextPath("/nope".into()), "x".into()).is_err());
    }

    #[test]
    fn invalid_scenes_are_rejected() {
        assert!(SceneDocument::from_json(r#"{"width": 0, "height": 10, "pages": [{}]}"#).is_err());
        assert!(SceneDocument::from_json(r#"{"width": 10, "height": 10, "pages": []}"#).is_err());
        assert!(
            SceneDocument::from_json(r#"{"width": 10, "height": 10, "current_page": 3, "pages": [{}]}"#).is_err()
        );
    }

    #[test]
    fn select_page_checks_range() {
        let mut doc = two_pages();
        assert!(doc.select_page(5).is_err());
        assert_eq!(doc.current_page(), 0);
    }
}
