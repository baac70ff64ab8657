//! # print-forge – print-production export pipeline
//!
//! This crate turns a paged design document into deliverable artifacts:
//! PNG/JPEG rasters, SVG, and print-ready PDFs with bleed, crop marks and a
//! safe-zone guide. An export runs through these stages:
//!
//! 1. **Gate** – check the request against the caller's tier ([`gate`])
//! 2. **Geometry** – resolve paper, bleed and DPI to pixels ([`units`])
//! 3. **Dispatch** – rasterize or serialize through a [`surface::RenderSurface`] ([`dispatch`])
//! 4. **Composite** – stamp the mandatory watermark on gated tiers ([`watermark`])
//! 5. **Assemble** – multi-page PDF with print marks via printpdf ([`assembler`], [`marks`])
//!
//! [`pipeline::ExportOrchestrator`] drives a single export; [`batch`] runs
//! many, optionally personalized through [`merge`], and zips the results.
//! [`scene::SceneDocument`] is a JSON document model that plugs into all of
//! it. A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod assembler;
pub mod batch;
pub mod dispatch;
pub mod error;
pub mod ffi;
pub mod fonts;
pub mod gate;
pub mod layout_config;
pub mod marks;
pub mod merge;
pub mod pipeline;
pub mod raster;
pub mod request;
pub mod scene;
pub mod surface;
pub mod templates;
pub mod units;
pub mod watermark;

// Re-exports for convenience
pub use error::{ErrorKind, ExportError, Result};
pub use gate::TierCapability;
pub use pipeline::{CancelFlag, ExportArtifact, ExportOrchestrator, PipelineConfig};
pub use request::{ExportFormat, ExportRequest};
pub use units::{PageOrientation, PaperSize};
