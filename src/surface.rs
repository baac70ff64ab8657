//! Boundary with the document/editor collaborator.
//!
//! The pipeline never touches a document directly. It talks to a
//! [`RenderSurface`], which owns the mutable drawing state of one document,
//! through a [`RenderContext`] handle. The handle serialises access: a
//! surface is not reentrant, so only one export may drive it at a time.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use image::RgbaImage;
use thiserror::Error;

use crate::error::{ExportError, Result};

/// Error reported by a document collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SurfaceError(pub String);

impl SurfaceError {
    pub fn new(msg: impl Into<String>) -> Self {
        SurfaceError(msg.into())
    }
}

impl From<SurfaceError> for ExportError {
    fn from(err: SurfaceError) -> Self {
        ExportError::RenderFailure(err.0)
    }
}

/// Background treatment for a rasterized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackgroundMode {
    #[default]
    OpaqueWhite,
    Transparent,
}

/// Parameters for one rasterization call.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterRequest {
    /// 0-based page index.
    pub page_index: u32,
    pub width: u32,
    pub height: u32,
    /// Target DPI divided by 72, for surfaces that scale by a device ratio.
    pub pixel_ratio: f64,
    pub background: BackgroundMode,
    /// When false, only template/background content is drawn.
    pub include_user_objects: bool,
}

/// One rasterized page. The buffer is owned by whichever stage requested
/// it and is dropped as soon as it has been encoded or embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterPage {
    page_index: u32,
    pixels: RgbaImage,
}

impl RasterPage {
    pub fn new(page_index: u32, pixels: RgbaImage) -> Self {
        Self { page_index, pixels }
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> RgbaImage {
        self.pixels
    }
}

/// A document that can be rasterized and serialized page by page.
pub trait RenderSurface {
    /// Number of pages in the document.
    fn page_count(&self) -> u32;

    /// 0-based index of the page currently shown in the editor.
    fn current_page(&self) -> u32;

    /// Switch the drawing context to `index`.
    fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError>;

    /// Rasterize one page at exactly `request.width × request.height`.
    ///
    /// Must be deterministic for a fixed document state and target size.
    fn rasterize(&mut self, request: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError>;

    /// Native vector representation (SVG) of the selected page, in the
    /// document's own coordinate space.
    fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError>;

    /// Human-readable document name, used for suggested filenames.
    fn title(&self) -> Option<String> {
        None
    }
}

impl<S: RenderSurface + ?Sized> RenderSurface for Box<S> {
    fn page_count(&self) -> u32 {
        (**self).page_count()
    }

    fn current_page(&self) -> u32 {
        (**self).current_page()
    }

    fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError> {
        (**self).select_page(index)
    }

    fn rasterize(&mut self, request: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError> {
        (**self).rasterize(request)
    }

    fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError> {
        (**self).serialize_vector()
    }

    fn title(&self) -> Option<String> {
        (**self).title()
    }
}

/// Run `f` against `surface`, then switch back to whichever page was
/// current before, whether `f` succeeded or not.
///
/// A failed restore is reported only when `f` itself succeeded; otherwise
/// the original error wins and the restore failure is logged.
pub fn preserving_current_page<S, T>(surface: &mut S, f: impl FnOnce(&mut S) -> Result<T>) -> Result<T>
where
    S: RenderSurface + ?Sized,
{
    let original = surface.current_page();
    let result = f(surface);
    if surface.current_page() != original {
        if let Err(e) = surface.select_page(original) {
            log::warn!("could not restore page {}: {e}", original + 1);
            if result.is_ok() {
                return Err(e.into());
            }
        }
    }
    result
}

/// Address of one text-bearing property inside a document, e.g.
/// `/pages/0/elements/3/text`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextPath(pub String);

impl fmt::Display for TextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A text property and its value at extraction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextField {
    pub path: TextPath,
    pub value: String,
}

/// Documents whose text can be rewritten for variable-data merge.
pub trait Personalize {
    /// Every text-bearing property, in document order.
    fn text_fields(&self) -> Vec<TextField>;

    /// Overwrite one property previously returned by [`text_fields`](Self::text_fields).
    fn write_text(&mut self, path: &TextPath, value: String) -> std::result::Result<(), SurfaceError>;
}

/// Explicitly owned, single-writer handle around a surface.
pub struct RenderContext<S> {
    surface: Mutex<S>,
}

impl<S> RenderContext<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface: Mutex::new(surface),
        }
    }

    /// Exclusive access for the duration of one export.
    pub fn lock(&self) -> Result<MutexGuard<'_, S>> {
        self.surface
            .lock()
            .map_err(|_| ExportError::RenderFailure("render context poisoned by an earlier panic".into()))
    }

    /// Independent copy of the current document state. Changes to the copy
    /// never flow back into this context.
    pub fn snapshot(&self) -> Result<S>
    where
        S: Clone,
    {
        Ok(self.lock()?.clone())
    }

    pub fn into_inner(self) -> Result<S> {
        self.surface
            .into_inner()
            .map_err(|_| ExportError::RenderFailure("render context poisoned by an earlier panic".into()))
    }
}

impl<S> fmt::Debug for RenderContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Counter(u32);

    #[test]
    fn snapshot_is_detached_from_context() {
        let ctx = RenderContext::new(Counter(1));
        let mut copy = ctx.snapshot().unwrap();
        copy.0 = 99;
        assert_eq!(*ctx.lock().unwrap(), Counter(1));
        assert_eq!(ctx.into_inner().unwrap(), Counter(1));
    }

    #[test]
    fn surface_errors_become_render_failures() {
        let err: ExportError = SurfaceError::new("canvas lost").into();
        assert!(matches!(err, ExportError::RenderFailure(ref m) if m == "canvas lost"));
    }

    struct Pager {
        current: u32,
        selects: Vec<u32>,
    }

    impl RenderSurface for Pager {
        fn page_count(&self) -> u32 {
            3
        }

        fn current_page(&self) -> u32 {
            self.current
        }

        fn select_page(&mut self, index: u32) -> std::result::Result<(), SurfaceError> {
            self.selects.push(index);
            self.current = index;
            Ok(())
        }

        fn rasterize(&mut self, _: &RasterRequest) -> std::result::Result<RasterPage, SurfaceError> {
            Err(SurfaceError::new("unused"))
        }

        fn serialize_vector(&mut self) -> std::result::Result<String, SurfaceError> {
            Ok(String::new())
        }
    }

    #[test]
    fn current_page_is_restored_after_failure() {
        let mut pager = Pager {
            current: 1,
            selects: Vec::new(),
        };
        let result: Result<()> = preserving_current_page(&mut pager, |s| {
            s.select_page(2)?;
            Err(ExportError::RenderFailure("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(pager.current, 1);
        assert_eq!(pager.selects, vec![2, 1]);
    }

    #[test]
    fn untouched_page_is_not_reselected() {
        let mut pager = Pager {
            current: 0,
            selects: Vec::new(),
        };
        preserving_current_page(&mut pager, |_| Ok(())).unwrap();
        assert!(pager.selects.is_empty());
    }

    #[test]
    fn raster_page_reports_buffer_size() {
        let page = RasterPage::new(2, RgbaImage::new(4, 3));
        assert_eq!((page.page_index(), page.width(), page.height()), (2, 4, 3));
    }
}
