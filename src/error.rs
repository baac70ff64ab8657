//! Error types for the export pipeline.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gate::Denial;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors that can occur while producing an export artifact.
#[derive(Error, Debug)]
pub enum ExportError {
    /// Bad paper size, bleed, page selection or format. Raised before any
    /// rendering work starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The resolved tier capability does not permit the request.
    #[error("Entitlement denied: {}", join_denials(.0))]
    EntitlementDenied(Vec<Denial>),

    /// Rasterization or vector serialization failed in the document collaborator.
    #[error("Render failure: {0}")]
    RenderFailure(String),

    /// The mandatory watermark could not be composited.
    #[error("Watermark failure: {0}")]
    WatermarkFailure(String),

    /// Some batch items failed; the batch itself still completed.
    #[error("Batch completed with failures: {succeeded} succeeded, {failed} failed")]
    PartialBatchFailure { succeeded: usize, failed: usize },

    /// I/O error while writing the final artifact or archive.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error while encoding the final image, document or archive bytes.
    #[error("Encoding error: {0}")]
    Encode(String),

    /// The export was cancelled between pages or items.
    #[error("Export cancelled")]
    Cancelled,
}

/// Flat classification of an [`ExportError`], cheap to copy into batch results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfiguration,
    EntitlementDenied,
    RenderFailure,
    WatermarkFailure,
    PartialBatchFailure,
    IoFailure,
    Cancelled,
}

impl ExportError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
            ExportError::EntitlementDenied(_) => ErrorKind::EntitlementDenied,
            ExportError::RenderFailure(_) => ErrorKind::RenderFailure,
            ExportError::WatermarkFailure(_) => ErrorKind::WatermarkFailure,
            ExportError::PartialBatchFailure { .. } => ErrorKind::PartialBatchFailure,
            ExportError::Io(_) | ExportError::Encode(_) => ErrorKind::IoFailure,
            ExportError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for errors raised before any rendering side effect.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidConfiguration | ErrorKind::EntitlementDenied
        )
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        ExportError::InvalidConfiguration(msg.into())
    }
}

impl ErrorKind {
    /// Stable numeric code used by the C ABI.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::InvalidConfiguration => 10,
            ErrorKind::EntitlementDenied => 11,
            ErrorKind::RenderFailure => 12,
            ErrorKind::WatermarkFailure => 13,
            ErrorKind::PartialBatchFailure => 14,
            ErrorKind::IoFailure => 15,
            ErrorKind::Cancelled => 16,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidConfiguration => "invalid configuration",
            ErrorKind::EntitlementDenied => "entitlement denied",
            ErrorKind::RenderFailure => "render failure",
            ErrorKind::WatermarkFailure => "watermark failure",
            ErrorKind::PartialBatchFailure => "partial batch failure",
            ErrorKind::IoFailure => "I/O failure",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

impl From<zip::result::ZipError> for ExportError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => ExportError::Io(e),
            other => ExportError::Encode(format!("ZIP error: {other}")),
        }
    }
}

fn join_denials(denials: &[Denial]) -> String {
    denials
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
