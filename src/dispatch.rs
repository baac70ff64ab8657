//! Format dispatch – one exhaustive `match` over [`ExportFormat`].
//!
//! Raster formats request a single bleed-inclusive raster; the vector
//! format bypasses rasterization and asks the document for its native
//! SVG; the print document is delegated to [`crate::assembler`].
//! Watermarking and final encoding happen afterwards in
//! [`crate::pipeline`], so this module never decides entitlement.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::assembler::{assemble, PrintDocument};
use crate::error::{ExportError, Result};
use crate::pipeline::CancelFlag;
use crate::raster::flatten_onto_white;
use crate::request::{ExportFormat, ExportRequest};
use crate::surface::{preserving_current_page, BackgroundMode, RasterPage, RasterRequest, RenderSurface};
use crate::units::PaperGeometry;

/// JPEG quality used when the caller does not override it.
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// What a format strategy produced, before watermarking and encoding.
#[derive(Debug)]
pub enum Dispatched {
    Raster(RasterPage),
    Vector(String),
    Document(PrintDocument),
}

/// Everything a strategy needs besides the surface itself.
#[derive(Debug, Clone, Copy)]
pub struct DispatchJob<'a> {
    pub request: &'a ExportRequest,
    pub geometry: &'a PaperGeometry,
    /// Resolved 0-based page indices, in output order.
    pub pages: &'a [u32],
    pub title: &'a str,
    pub cancel: &'a CancelFlag,
}

/// Background mode for a raster export. Only PNG can carry transparency;
/// a JPEG request for a transparent background is rendered opaque.
pub fn background_for(request: &ExportRequest) -> BackgroundMode {
    if !request.transparent_background {
        return BackgroundMode::OpaqueWhite;
    }
    if request.format.is_raster() && request.format.supports_alpha() {
        BackgroundMode::Transparent
    } else {
        log::debug!("{} output has no alpha channel; rendering on an opaque background", request.format);
        BackgroundMode::OpaqueWhite
    }
}

/// Run the strategy for `job.request.format` against `surface`.
pub fn dispatch<S>(surface: &mut S, job: &DispatchJob<'_>) -> Result<Dispatched>
where
    S: RenderSurface + ?Sized,
{
    match job.request.format {
        ExportFormat::RasterPng | ExportFormat::RasterJpeg => {
            let index = single_page(job)?;
            let page = preserving_current_page(surface, |s| {
                if s.current_page() != index {
                    s.select_page(index)?;
                }
                rasterize_checked(
                    s,
                    &RasterRequest {
                        page_index: index,
                        width: job.geometry.pixel_width,
                        height: job.geometry.pixel_height,
                        pixel_ratio: job.geometry.pixel_ratio(),
                        background: background_for(job.request),
                        include_user_objects: true,
                    },
                )
            })?;
            Ok(Dispatched::Raster(page))
        }
        ExportFormat::VectorSvg => {
            let index = single_page(job)?;
            let svg = preserving_current_page(surface, |s| {
                if s.current_page() != index {
                    s.select_page(index)?;
                }
                Ok(s.serialize_vector()?)
            })?;
            Ok(Dispatched::Vector(svg))
        }
        ExportFormat::PrintDocument => {
            let doc = assemble(surface, job.request, job.geometry, job.pages, job.title, job.cancel)?;
            Ok(Dispatched::Document(doc))
        }
    }
}

fn single_page(job: &DispatchJob<'_>) -> Result<u32> {
    match job.pages {
        [index] => Ok(*index),
        other => Err(ExportError::invalid(format!(
            "{} exports exactly one page, {} selected",
            job.request.format,
            other.len()
        ))),
    }
}

/// Rasterize and reject buffers that do not match the requested size.
pub(crate) fn rasterize_checked<S>(surface: &mut S, request: &RasterRequest) -> Result<RasterPage>
where
    S: RenderSurface + ?Sized,
{
    let page = surface.rasterize(request)?;
    if page.width() != request.width || page.height() != request.height {
        return Err(ExportError::RenderFailure(format!(
            "page {} rasterized at {}×{} px, expected {}×{}",
            request.page_index + 1,
            page.width(),
            page.height(),
            request.width,
            request.height
        )));
    }
    log::debug!(
        "rasterized page {} at {}×{} px",
        request.page_index + 1,
        request.width,
        request.height
    );
    Ok(page)
}

/// Encode a raster page for `format`. The page is consumed.
pub fn encode_raster(page: RasterPage, format: ExportFormat, jpeg_quality: u8) -> Result<Vec<u8>> {
    let pixels = page.into_pixels();
    match format {
        ExportFormat::RasterPng => encode_png(&pixels),
        ExportFormat::RasterJpeg => encode_jpeg(&pixels, jpeg_quality),
        ExportFormat::VectorSvg | ExportFormat::PrintDocument => Err(ExportError::invalid(format!(
            "{format} is not a raster format"
        ))),
    }
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)?;
    Ok(buf)
}

/// Opaque RGB PNG, used where transparency must not survive (print pages).
pub fn encode_png_opaque(img: &RgbaImage) -> Result<Vec<u8>> {
    let rgb = flatten_onto_white(img);
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf).write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)?;
    Ok(buf)
}

/// JPEG at `quality` (1–100), flattened onto white first.
pub fn encode_jpeg(img: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = flatten_onto_white(img);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QualityTier;
    use crate::surface::SurfaceError;
    use crate::units::resolve_geometry;
    use image::Rgba;

    struct Flat {
        current: u32,
        last_request: Option<RasterRequest>,
        wrong_size: bool,
    }

    impl Flat {
        fn new() -> Self {
            Self {
                current: 0,
                last_request: None,
                wrong_size: false,
            }
        }
    }

    impl RenderSurface for Flat {
        fn page_count(&self) -> u32 {
            2
        }

        fn current_page(&self) -> u32 {
            self.current
        }

        fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError> {
            self.current = index;
            Ok(())
        }

        fn rasterize(&mut self, request: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError> {
            self.last_request = Some(request.clone());
            let w = if self.wrong_size { request.width + 1 } else { request.width };
            let fill = match request.background {
                BackgroundMode::OpaqueWhite => Rgba([255, 255, 255, 255]),
                BackgroundMode::Transparent => Rgba([0, 0, 0, 0]),
            };
            Ok(RasterPage::new(request.page_index, RgbaImage::from_pixel(w, request.height, fill)))
        }

        fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError> {
            Ok(format!("<svg data-page=\"{}\"/>", self.current))
        }
    }

    fn run(surface: &mut Flat, request: &ExportRequest, pages: &[u32]) -> Result<Dispatched> {
        let geometry = resolve_geometry(request)?;
        let cancel = CancelFlag::new();
        dispatch(
            surface,
            &DispatchJob {
                request,
                geometry: &geometry,
                pages,
                title: "test",
                cancel: &cancel,
            },
        )
    }

    #[test]
    fn jpeg_forces_opaque_background() {
        let req = ExportRequest::new(ExportFormat::RasterJpeg).with_transparent_background(true);
        assert_eq!(background_for(&req), BackgroundMode::OpaqueWhite);
        let req = ExportRequest::new(ExportFormat::RasterPng).with_transparent_background(true);
        assert_eq!(background_for(&req), BackgroundMode::Transparent);
        let req = ExportRequest::new(ExportFormat::RasterPng);
        assert_eq!(background_for(&req), BackgroundMode::OpaqueWhite);
    }

    #[test]
    fn only_raster_formats_render_transparent() {
        for format in [ExportFormat::VectorSvg, ExportFormat::PrintDocument] {
            let req = ExportRequest::new(format).with_transparent_background(true);
            assert_eq!(background_for(&req), BackgroundMode::OpaqueWhite, "{format}");
        }
    }

    #[test]
    fn raster_request_uses_resolved_geometry() {
        let mut surface = Flat::new();
        let req = ExportRequest::new(ExportFormat::RasterPng).with_quality(QualityTier::Print);
        match run(&mut surface, &req, &[0]).unwrap() {
            Dispatched::Raster(page) => assert_eq!((page.width(), page.height()), (2480, 3508)),
            other => panic!("unexpected {other:?}"),
        }
        let sent = surface.last_request.unwrap();
        assert!((sent.pixel_ratio - 300.0 / 72.0).abs() < 1e-9);
        assert!(sent.include_user_objects);
    }

    #[test]
    fn vector_export_selects_page_and_restores() {
        let mut surface = Flat::new();
        let req = ExportRequest::new(ExportFormat::VectorSvg);
        match run(&mut surface, &req, &[1]).unwrap() {
            Dispatched::Vector(svg) => assert_eq!(svg, "<svg data-page=\"1\"/>"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(surface.current, 0);
        assert!(surface.last_request.is_none(), "vector export must not rasterize");
    }

    #[test]
    fn single_image_formats_need_exactly_one_page() {
        let mut surface = Flat::new();
        let req = ExportRequest::new(ExportFormat::RasterPng);
        let err = run(&mut surface, &req, &[0, 1]).unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfiguration(_)));
    }

    #[test]
    fn mis_sized_raster_is_a_render_failure() {
        let mut surface = Flat::new();
        surface.wrong_size = true;
        let req = ExportRequest::new(ExportFormat::RasterPng);
        let err = run(&mut surface, &req, &[0]).unwrap_err();
        assert!(matches!(err, ExportError::RenderFailure(_)));
    }

    #[test]
    fn encoders_produce_their_signatures() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 128]));
        let png = encode_png(&img).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let jpg = encode_jpeg(&img, DEFAULT_JPEG_QUALITY).unwrap();
        assert_eq!(&jpg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn vector_formats_cannot_be_raster_encoded() {
        let page = RasterPage::new(0, RgbaImage::new(1, 1));
        assert!(encode_raster(page, ExportFormat::VectorSvg, 95).is_err());
    }
}
