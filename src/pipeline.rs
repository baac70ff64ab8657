//! Pipeline – ties together gating, geometry, page selection, format
//! dispatch, watermarking and encoding into a single call.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::batch::{sanitize_name, BatchExportCoordinator, BatchItem, BatchProgress, BatchResult};
use crate::dispatch::{dispatch, encode_raster, DispatchJob, Dispatched, DEFAULT_JPEG_QUALITY};
use crate::error::{ExportError, Result};
use crate::fonts::FontManager;
use crate::gate::{self, CapabilityResolver, TierCapability};
use crate::merge::PersonalizationRow;
use crate::request::{ExportRequest, PageSelection};
use crate::surface::{Personalize, RenderContext, RenderSurface};
use crate::units::resolve_geometry;
use crate::watermark::{Watermark, DEFAULT_WATERMARK_TEXT};

/// Configuration for the export pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Document title embedded in PDF metadata (default: "Untitled").
    pub title: String,
    /// Base for suggested filenames. Falls back to the surface's title,
    /// then to `title`.
    pub file_stem: Option<String>,
    /// Text of the mandatory watermark on gated tiers.
    pub watermark_text: String,
    /// JPEG quality, 1–100 (default: 95).
    pub jpeg_quality: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            file_stem: None,
            watermark_text: DEFAULT_WATERMARK_TEXT.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl PipelineConfig {
    /// Default config with a document title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = Some(stem.into());
        self
    }

    pub fn with_watermark_text(mut self, text: impl Into<String>) -> Self {
        self.watermark_text = text.into();
        self
    }
}

/// A finished export, ready to hand off for download or storage.
#[derive(Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub suggested_filename: String,
}

impl fmt::Debug for ExportArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportArtifact")
            .field("bytes", &format_args!("[{} bytes]", self.bytes.len()))
            .field("mime_type", &self.mime_type)
            .field("suggested_filename", &self.suggested_filename)
            .finish()
    }
}

/// Cooperative cancellation, checked between pages and between batch items.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Top-level entry point for single and batch exports.
pub struct ExportOrchestrator {
    config: PipelineConfig,
    fonts: FontManager,
}

impl Default for ExportOrchestrator {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl ExportOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            fonts: FontManager::default(),
        }
    }

    /// Use `fonts` for watermark glyphs. The first face loaded into the
    /// manager draws the mark; with none loaded the builtin block font does.
    pub fn with_fonts(mut self, fonts: FontManager) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Export from a shared document. The context stays locked for the
    /// whole export, so no other export can drive the same surface meanwhile.
    pub fn export_one<S: RenderSurface>(
        &self,
        context: &RenderContext<S>,
        request: &ExportRequest,
        capability: &TierCapability,
    ) -> Result<ExportArtifact> {
        let mut surface = context.lock()?;
        self.export_surface(&mut *surface, request, capability, &CancelFlag::new())
    }

    /// [`export_one`](Self::export_one) with the capability looked up for `user_id`.
    pub fn export_for_user<S: RenderSurface, R: CapabilityResolver + ?Sized>(
        &self,
        context: &RenderContext<S>,
        request: &ExportRequest,
        resolver: &R,
        user_id: &str,
    ) -> Result<ExportArtifact> {
        let capability = resolver.resolve_capability(user_id)?;
        self.export_one(context, request, &capability)
    }

    /// Export from a surface the caller already has exclusive access to.
    pub fn export_surface<S: RenderSurface + ?Sized>(
        &self,
        surface: &mut S,
        request: &ExportRequest,
        capability: &TierCapability,
        cancel: &CancelFlag,
    ) -> Result<ExportArtifact> {
        // Pre-flight: nothing below touches the surface until all of this passes.
        gate::check(request, capability, false)?;
        let geometry = resolve_geometry(request)?;
        let pages = resolve_pages(request, &*surface)?;
        if cancel.is_cancelled() {
            return Err(ExportError::Cancelled);
        }

        let stem = self.file_stem(&*surface);
        let title = surface.title().unwrap_or_else(|| self.config.title.clone());
        let format = request.format;

        let dispatched = dispatch(
            &mut *surface,
            &DispatchJob {
                request,
                geometry: &geometry,
                pages: &pages,
                title: &title,
                cancel,
            },
        )?;

        let bytes = match dispatched {
            Dispatched::Raster(mut page) => {
                if capability.watermark_required {
                    Watermark::new(self.config.watermark_text.clone())
                        .with_font_family(self.fonts.default_family())
                        .apply(&mut page, &self.fonts)?;
                }
                encode_raster(page, format, self.config.jpeg_quality)?
            }
            Dispatched::Vector(svg) => svg.into_bytes(),
            Dispatched::Document(doc) => doc.bytes,
        };

        let suggested_filename = if format.is_single_image() && surface.page_count() > 1 {
            format!("{stem}-page-{}.{}", pages[0] + 1, format.extension())
        } else {
            format!("{stem}.{}", format.extension())
        };
        log::info!("exported {suggested_filename} ({format}, {} bytes)", bytes.len());

        Ok(ExportArtifact {
            bytes,
            mime_type: format.mime_type().to_string(),
            suggested_filename,
        })
    }

    /// Export many documents or personalization rows, one at a time.
    pub fn export_batch<S, F>(
        &self,
        items: &[BatchItem<'_, S>],
        request: &ExportRequest,
        capability: &TierCapability,
        cancel: &CancelFlag,
        progress: F,
    ) -> Result<BatchResult>
    where
        S: RenderSurface + Personalize + Clone,
        F: FnMut(BatchProgress),
    {
        BatchExportCoordinator::new(self)
            .with_cancel(cancel.clone())
            .run(items, request, capability, progress)
    }

    /// One personalized export per row, all from the same base document.
    pub fn export_rows<S, F>(
        &self,
        document: &RenderContext<S>,
        rows: Vec<PersonalizationRow>,
        request: &ExportRequest,
        capability: &TierCapability,
        progress: F,
    ) -> Result<BatchResult>
    where
        S: RenderSurface + Personalize + Clone,
        F: FnMut(BatchProgress),
    {
        let base = document
            .lock()?
            .title()
            .unwrap_or_else(|| self.config.title.clone());
        let items: Vec<BatchItem<'_, S>> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| BatchItem::personalized(format!("{base}-{}", i + 1), document, row))
            .collect();
        self.export_batch(&items, request, capability, &CancelFlag::new(), progress)
    }

    fn file_stem<S: RenderSurface + ?Sized>(&self, surface: &S) -> String {
        let raw = self
            .config
            .file_stem
            .clone()
            .or_else(|| surface.title())
            .unwrap_or_else(|| self.config.title.clone());
        sanitize_name(&raw)
    }
}

/// Pages to export. Single-image formats always produce exactly one page:
/// `All` and `Current` both mean the current page there.
pub fn resolve_pages<S: RenderSurface + ?Sized>(request: &ExportRequest, surface: &S) -> Result<Vec<u32>> {
    let count = surface.page_count();
    let current = surface.current_page();
    if !request.format.is_single_image() {
        return request.page_selection.resolve(count, current);
    }
    match &request.page_selection {
        PageSelection::All | PageSelection::Current => PageSelection::Current.resolve(count, current),
        PageSelection::Pages(pages) if pages.len() == 1 => request.page_selection.resolve(count, current),
        PageSelection::Pages(pages) => Err(ExportError::invalid(format!(
            "{} exports a single page, but {} pages were selected",
            request.format,
            pages.len()
        ))),
    }
}
