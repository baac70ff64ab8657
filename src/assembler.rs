//! Print document assembly – N rasterized pages into one PDF using
//! `printpdf` (v0.8 ops-based API).
//!
//! Each page raster covers the full bleed box and is embedded at its
//! physical size. Crop marks and the safe-zone guide are drawn as vector
//! strokes on top, so they stay sharp at any zoom.

use printpdf::{
    Cmyk, Color, Line, LinePoint, Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Point, Pt, RawImage,
    Rgb, XObjectId, XObjectTransform,
};

use crate::dispatch::{encode_png_opaque, rasterize_checked};
use crate::error::{ExportError, Result};
use crate::layout_config::{PageLayout, PrintLayout};
use crate::marks::MarkKind;
use crate::pipeline::CancelFlag;
use crate::request::{ColorProfile, ExportRequest};
use crate::surface::{preserving_current_page, BackgroundMode, RasterRequest, RenderSurface};
use crate::units::{mm_to_pt, PaperGeometry};

/// Stroke width of crop marks and the safe-zone guide.
pub const HAIRLINE_PT: f32 = 0.25;

/// A finished print document and the layout it was built from.
#[derive(Debug, Clone)]
pub struct PrintDocument {
    pub bytes: Vec<u8>,
    pub layout: PrintLayout,
}

impl PrintDocument {
    pub fn page_count(&self) -> usize {
        self.layout.page_count()
    }
}

/// Rasterize `pages` one at a time, in order, and assemble them.
///
/// The surface is switched back to its original page afterwards, also when
/// a page fails or the export is cancelled.
pub fn assemble<S>(
    surface: &mut S,
    request: &ExportRequest,
    geometry: &PaperGeometry,
    pages: &[u32],
    title: &str,
    cancel: &CancelFlag,
) -> Result<PrintDocument>
where
    S: RenderSurface + ?Sized,
{
    if pages.is_empty() {
        return Err(ExportError::invalid("print document needs at least one page"));
    }
    let layout = PrintLayout::build(geometry, request, pages, title);
    let page_w = Mm(layout.media_width_mm() as f32);
    let page_h = Mm(layout.media_height_mm() as f32);

    let mut doc = PdfDocument::new(title);
    let mut pdf_pages = Vec::with_capacity(layout.page_count());
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();
    let editor_page = surface.current_page();

    preserving_current_page(surface, |surface| {
        for (n, page) in layout.pages.iter().enumerate() {
            if cancel.is_cancelled() {
                log::info!("print document cancelled after {n} of {} pages", layout.page_count());
                return Err(ExportError::Cancelled);
            }
            if surface.current_page() != page.page_index {
                surface.select_page(page.page_index)?;
            }
            let raster = rasterize_checked(
                surface,
                &RasterRequest {
                    page_index: page.page_index,
                    width: geometry.pixel_width,
                    height: geometry.pixel_height,
                    pixel_ratio: geometry.pixel_ratio(),
                    background: BackgroundMode::OpaqueWhite,
                    include_user_objects: request.multi_page_include_user_objects
                        || page.page_index == editor_page,
                },
            )?;
            let png = encode_png_opaque(raster.pixels())?;
            drop(raster);

            let raw = RawImage::decode_from_bytes(&png, &mut img_warnings)
                .map_err(|e| ExportError::Encode(format!("page {} image: {e}", page.page_index + 1)))?;
            let xobj_id = doc.add_image(&raw);
            pdf_pages.push(PdfPage::new(page_w, page_h, page_ops(&layout, page, xobj_id)));
        }
        Ok(())
    })?;

    doc.with_pages(pdf_pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut Vec::new());
    log::info!(
        "assembled {} page print document ({} bytes, {:.1}×{:.1} mm sheet)",
        layout.page_count(),
        bytes.len(),
        layout.media_width_mm(),
        layout.media_height_mm()
    );

    Ok(PrintDocument { bytes, layout })
}

/// Ops for one page: the raster first, marks on top.
fn page_ops(layout: &PrintLayout, page: &PageLayout, xobj_id: XObjectId) -> Vec<Op> {
    let mut ops = Vec::new();
    let img = &page.image;

    // At dpi=72 printpdf renders 1 px = 1 pt, so scale = desired_pt / px.
    let scale_x = mm_to_pt(img.width_mm) as f32 / img.pixel_width.max(1) as f32;
    let scale_y = mm_to_pt(img.height_mm) as f32 / img.pixel_height.max(1) as f32;
    // Placement is measured from the sheet's top-left; PDF origin is bottom-left.
    let left = mm_to_pt(img.x_mm);
    let bottom = layout.media_height_pt() - mm_to_pt(img.y_mm + img.height_mm);

    ops.push(Op::UseXobject {
        id: xobj_id,
        transform: XObjectTransform {
            translate_x: Some(Pt(left as f32)),
            translate_y: Some(Pt(bottom as f32)),
            dpi: Some(72.0),
            scale_x: Some(scale_x),
            scale_y: Some(scale_y),
            rotate: None,
        },
    });

    let mut current_kind = None;
    for mark in &page.marks {
        if current_kind != Some(mark.kind()) {
            ops.push(Op::SetOutlineColor {
                col: mark_color(mark.kind(), layout.color_profile),
            });
            ops.push(Op::SetOutlineThickness { pt: Pt(HAIRLINE_PT) });
            current_kind = Some(mark.kind());
        }
        for (from, to) in mark.segments() {
            let (x1, y1) = layout.to_pdf_point(from.x, from.y);
            let (x2, y2) = layout.to_pdf_point(to.x, to.y);
            ops.push(Op::DrawLine {
                line: Line {
                    points: vec![
                        LinePoint {
                            p: Point {
                                x: Pt(x1 as f32),
                                y: Pt(y1 as f32),
                            },
                            bezier: false,
                        },
                        LinePoint {
                            p: Point {
                                x: Pt(x2 as f32),
                                y: Pt(y2 as f32),
                            },
                            bezier: false,
                        },
                    ],
                    is_closed: false,
                },
            });
        }
    }
    ops
}

/// Registration colour for crop marks, cyan for the safe-zone guide.
fn mark_color(kind: MarkKind, profile: ColorProfile) -> Color {
    match (kind, profile) {
        (MarkKind::Crop, ColorProfile::Cmyk) => Color::Cmyk(Cmyk {
            c: 1.0,
            m: 1.0,
            y: 1.0,
            k: 1.0,
            icc_profile: None,
        }),
        (MarkKind::Crop, _) => Color::Rgb(Rgb {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            icc_profile: None,
        }),
        (MarkKind::SafeZone, ColorProfile::Cmyk) => Color::Cmyk(Cmyk {
            c: 1.0,
            m: 0.0,
            y: 0.0,
            k: 0.0,
            icc_profile: None,
        }),
        (MarkKind::SafeZone, _) => Color::Rgb(Rgb {
            r: 0.0,
            g: 0.68,
            b: 0.94,
            icc_profile: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::QualityTier;
    use crate::surface::{RasterPage, SurfaceError};
    use crate::units::{resolve_geometry, PaperSize};
    use image::{Rgba, RgbaImage};

    /// Four-page document that can be told to fail on one page.
    struct Book {
        current: u32,
        fail_on: Option<u32>,
        calls: Vec<(u32, bool)>,
    }

    impl Book {
        fn new() -> Self {
            Self {
                current: 1,
                fail_on: None,
                calls: Vec::new(),
            }
        }
    }

    impl RenderSurface for Book {
        fn page_count(&self) -> u32 {
            4
        }

        fn current_page(&self) -> u32 {
            self.current
        }

        fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError> {
            self.current = index;
            Ok(())
        }

        fn rasterize(&mut self, request: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError> {
            assert_eq!(request.page_index, self.current, "page not selected before rasterize");
            self.calls.push((request.page_index, request.include_user_objects));
            if self.fail_on == Some(request.page_index) {
                return Err(SurfaceError::new("canvas lost"));
            }
            Ok(RasterPage::new(
                request.page_index,
                RgbaImage::from_pixel(request.width, request.height, Rgba([200, 220, 240, 255])),
            ))
        }

        fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError> {
            Ok(String::new())
        }
    }

    fn small_request() -> ExportRequest {
        ExportRequest::print_document(PaperSize::A6, 3.0).with_quality(QualityTier::Screen)
    }

    fn build(book: &mut Book, request: &ExportRequest, pages: &[u32], cancel: &CancelFlag) -> Result<PrintDocument> {
        let g = resolve_geometry(request)?;
        assemble(book, request, &g, pages, "Book", cancel)
    }

    #[test]
    fn pages_follow_selection_order_and_restore_current() {
        let mut book = Book::new();
        let doc = build(&mut book, &small_request(), &[3, 0, 2], &CancelFlag::new()).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(
            book.calls.iter().map(|c| c.0).collect::<Vec<_>>(),
            vec![3, 0, 2]
        );
        assert_eq!(book.current, 1);
        assert!(doc.bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn template_only_pages_except_the_current_one() {
        let mut book = Book::new();
        let mut req = small_request();
        req.multi_page_include_user_objects = false;
        build(&mut book, &req, &[0, 1, 2], &CancelFlag::new()).unwrap();
        assert_eq!(book.calls, vec![(0, false), (1, true), (2, false)]);
    }

    #[test]
    fn failure_midway_restores_page_and_reports_render_failure() {
        let mut book = Book::new();
        book.fail_on = Some(2);
        let err = build(&mut book, &small_request(), &[0, 2, 3], &CancelFlag::new()).unwrap_err();
        assert!(matches!(err, ExportError::RenderFailure(ref m) if m == "canvas lost"));
        assert_eq!(book.calls.len(), 2);
        assert_eq!(book.current, 1);
    }

    #[test]
    fn cancelled_before_first_page_rasterizes_nothing() {
        let mut book = Book::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = build(&mut book, &small_request(), &[0, 1], &cancel).unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
        assert!(book.calls.is_empty());
    }

    #[test]
    fn marks_are_drawn_over_the_image() {
        let req = small_request().with_marks(true, true);
        let g = resolve_geometry(&req).unwrap();
        let layout = PrintLayout::build(&g, &req, &[0], "t");
        let ops = page_ops(&layout, &layout.pages[0], XObjectId::new());
        assert!(matches!(ops[0], Op::UseXobject { .. }));
        let lines = ops.iter().filter(|op| matches!(op, Op::DrawLine { .. })).count();
        let expected: usize = layout.pages[0].marks.iter().map(|m| m.segments().len()).sum();
        assert_eq!(lines, expected);
        assert!(lines > 8);
    }

    fn image_translation(ops: &[Op]) -> (f32, f32) {
        match &ops[0] {
            Op::UseXobject { transform, .. } => (
                transform.translate_x.map(|p| p.0).unwrap_or_default(),
                transform.translate_y.map(|p| p.0).unwrap_or_default(),
            ),
            other => panic!("expected image first, got {other:?}"),
        }
    }

    #[test]
    fn image_sits_inside_the_slug() {
        let req = small_request().with_marks(true, false);
        let g = resolve_geometry(&req).unwrap();
        let layout = PrintLayout::build(&g, &req, &[0], "t");
        let (x, y) = image_translation(&page_ops(&layout, &layout.pages[0], XObjectId::new()));
        let slug_pt = mm_to_pt(layout.slug_mm) as f32;
        assert!((x - slug_pt).abs() < 0.01);
        assert!((y - slug_pt).abs() < 0.01);
    }

    #[test]
    fn image_follows_its_recorded_placement() {
        let req = small_request().with_marks(true, false);
        let g = resolve_geometry(&req).unwrap();
        let mut layout = PrintLayout::build(&g, &req, &[0], "t");
        let (x0, y0) = image_translation(&page_ops(&layout, &layout.pages[0], XObjectId::new()));

        layout.pages[0].image.x_mm += 10.0;
        layout.pages[0].image.y_mm += 5.0;
        let (x1, y1) = image_translation(&page_ops(&layout, &layout.pages[0], XObjectId::new()));
        assert!((x1 - x0 - mm_to_pt(10.0) as f32).abs() < 0.01);
        // Moving down the sheet lowers the PDF y coordinate.
        assert!((y0 - y1 - mm_to_pt(5.0) as f32).abs() < 0.01);
    }

    #[test]
    fn registration_colour_follows_profile() {
        assert!(matches!(
            mark_color(MarkKind::Crop, ColorProfile::Cmyk),
            Color::Cmyk(Cmyk { c, m, y, k, .. }) if c == 1.0 && m == 1.0 && y == 1.0 && k == 1.0
        ));
        assert!(matches!(mark_color(MarkKind::Crop, ColorProfile::Srgb), Color::Rgb(_)));
    }
}
