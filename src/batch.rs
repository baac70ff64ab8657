//! Batch export – many documents or personalization rows, one at a time.
//!
//! Items run strictly in order against the orchestrator. A failed item is
//! recorded and the loop moves on; only pre-flight problems (entitlement,
//! bad geometry) and a failure to write the archive abort the batch.

use std::fmt;
use std::io::{Cursor, Write};

use serde::Serialize;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{ErrorKind, ExportError, Result};
use crate::gate::{self, TierCapability};
use crate::merge::{personalize, PersonalizationRow};
use crate::pipeline::{CancelFlag, ExportArtifact, ExportOrchestrator};
use crate::request::ExportRequest;
use crate::surface::{Personalize, RenderContext, RenderSurface};
use crate::units::resolve_geometry;

/// One unit of batch work: a document, optionally personalized.
pub struct BatchItem<'a, S> {
    /// Base name for the archive entry.
    pub name: String,
    pub document: &'a RenderContext<S>,
    /// When present, the export runs on a personalized copy of `document`.
    pub row: Option<PersonalizationRow>,
}

impl<'a, S> BatchItem<'a, S> {
    pub fn new(name: impl Into<String>, document: &'a RenderContext<S>) -> Self {
        Self {
            name: name.into(),
            document,
            row: None,
        }
    }

    pub fn personalized(name: impl Into<String>, document: &'a RenderContext<S>, row: PersonalizationRow) -> Self {
        Self {
            name: name.into(),
            document,
            row: Some(row),
        }
    }
}

/// Reported after every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItemStatus {
    Success(ExportArtifact),
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemResult {
    /// 0-based position in the input.
    pub index: usize,
    pub name: String,
    pub status: BatchItemStatus,
}

impl BatchItemResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, BatchItemStatus::Success(_))
    }
}

/// Finalized outcome of a batch. Items appear in processing order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub items: Vec<BatchItemResult>,
    pub succeeded_count: usize,
    pub failed_count: usize,
    /// ZIP of every successful artifact; `None` when nothing succeeded.
    pub archive: Option<ExportArtifact>,
    /// True when the batch stopped early on a cancel request.
    pub cancelled: bool,
}

impl BatchResult {
    /// `Ok` when every processed item succeeded, otherwise
    /// [`ExportError::PartialBatchFailure`] with the counts.
    pub fn outcome(&self) -> Result<()> {
        if self.failed_count == 0 {
            Ok(())
        } else {
            Err(ExportError::PartialBatchFailure {
                succeeded: self.succeeded_count,
                failed: self.failed_count,
            })
        }
    }

    /// One line plus one line per failed item.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} succeeded, {} failed{}",
            self.succeeded_count,
            self.failed_count,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        for item in &self.items {
            if let BatchItemStatus::Failed { kind, message } = &item.status {
                out.push_str(&format!("\n  #{} {}: {kind}: {message}", item.index + 1, item.name));
            }
        }
        out
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Drives a batch through an [`ExportOrchestrator`].
pub struct BatchExportCoordinator<'o> {
    orchestrator: &'o ExportOrchestrator,
    cancel: CancelFlag,
}

impl<'o> BatchExportCoordinator<'o> {
    pub fn new(orchestrator: &'o ExportOrchestrator) -> Self {
        Self {
            orchestrator,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run<S, F>(
        &self,
        items: &[BatchItem<'_, S>],
        request: &ExportRequest,
        capability: &TierCapability,
        mut progress: F,
    ) -> Result<BatchResult>
    where
        S: RenderSurface + Personalize + Clone,
        F: FnMut(BatchProgress),
    {
        gate::check(request, capability, true)?;
        resolve_geometry(request)?;

        let total = items.len();
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::info!("batch cancelled after {index} of {total} items");
                cancelled = true;
                break;
            }

            let outcome = self.export_item(item, request, capability);
            if matches!(outcome, Err(ExportError::Cancelled)) {
                log::info!("batch cancelled during item {}", index + 1);
                cancelled = true;
                break;
            }
            let status = match outcome {
                Ok(artifact) => BatchItemStatus::Success(artifact),
                Err(e) => {
                    log::warn!("batch item {} ({}) failed: {e}", index + 1, item.name);
                    BatchItemStatus::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            results.push(BatchItemResult {
                index,
                name: item.name.clone(),
                status,
            });
            progress(BatchProgress {
                completed: index + 1,
                total,
            });
        }

        let succeeded_count = results.iter().filter(|r| r.is_success()).count();
        let failed_count = results.len() - succeeded_count;
        let archive = if succeeded_count > 0 {
            Some(build_archive(&results, &self.orchestrator.config().title)?)
        } else {
            None
        };
        log::info!("batch finished: {succeeded_count} succeeded, {failed_count} failed");

        Ok(BatchResult {
            items: results,
            succeeded_count,
            failed_count,
            archive,
            cancelled,
        })
    }

    fn export_item<S>(
        &self,
        item: &BatchItem<'_, S>,
        request: &ExportRequest,
        capability: &TierCapability,
    ) -> Result<ExportArtifact>
    where
        S: RenderSurface + Personalize + Clone,
    {
        match &item.row {
            // The copy is dropped with this arm; the base document never sees it.
            Some(row) => {
                let mut copy = item.document.snapshot()?;
                personalize(&mut copy, row)?;
                self.orchestrator
                    .export_surface(&mut copy, request, capability, &self.cancel)
            }
            None => {
                let mut surface = item.document.lock()?;
                self.orchestrator
                    .export_surface(&mut *surface, request, capability, &self.cancel)
            }
        }
    }
}

/// Lowercased, runs outside `[a-z0-9-_]` collapsed to `_`, `_` trimmed.
/// Empty results become `document`.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_' {
            if pending_sep {
                out.push('_');
                pending_sep = false;
            }
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `NNN_<name>.<ext>`, 1-based.
pub fn archive_entry_name(index: usize, name: &str, artifact: &ExportArtifact) -> String {
    let ext = artifact
        .suggested_filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .unwrap_or("bin");
    format!("{:03}_{}.{}", index + 1, sanitize_name(name), ext)
}

fn build_archive(results: &[BatchItemResult], title: &str) -> Result<ExportArtifact> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for result in results {
        let BatchItemStatus::Success(artifact) = &result.status else {
            continue;
        };
        // PNG, JPEG and PDF are already compressed.
        let method = if artifact.mime_type == "image/svg+xml" {
            CompressionMethod::Deflated
        } else {
            CompressionMethod::Stored
        };
        let options = SimpleFileOptions::default()
            .compression_method(method)
            .last_modified_time(zip::DateTime::default());
        zip.start_file(archive_entry_name(result.index, &result.name, artifact), options)?;
        zip.write_all(&artifact.bytes)?;
    }
    let bytes = zip.finish()?.into_inner();
    Ok(ExportArtifact {
        bytes,
        mime_type: "application/zip".to_string(),
        suggested_filename: format!("{}-batch.zip", sanitize_name(title)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, mime: &str) -> ExportArtifact {
        ExportArtifact {
            bytes: name.as_bytes().to_vec(),
            mime_type: mime.to_string(),
            suggested_filename: name.to_string(),
        }
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("Ada Lovelace"), "ada_lovelace");
        assert_eq!(sanitize_name("  Über-Q3 Report!! "), "ber-q3_report");
        assert_eq!(sanitize_name("***"), "document");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn entry_names_are_numbered_from_one() {
        let a = artifact("card.png", "image/png");
        assert_eq!(archive_entry_name(0, "Ada", &a), "001_ada.png");
        assert_eq!(archive_entry_name(11, "", &a), "012_document.png");
    }

    #[test]
    fn archive_holds_only_successes() {
        let results = vec![
            BatchItemResult {
                index: 0,
                name: "one".into(),
                status: BatchItemStatus::Success(artifact("one.svg", "image/svg+xml")),
            },
            BatchItemResult {
                index: 1,
                name: "two".into(),
                status: BatchItemStatus::Failed {
                    kind: ErrorKind::RenderFailure,
                    message: "boom".into(),
                },
            },
            BatchItemResult {
                index: 2,
                name: "three".into(),
                status: BatchItemStatus::Success(artifact("three.png", "image/png")),
            },
        ];
        let zip_artifact = build_archive(&results, "Cards").unwrap();
        assert_eq!(zip_artifact.suggested_filename, "cards-batch.zip");

        let mut archive = zip::ZipArchive::new(Cursor::new(zip_artifact.bytes)).unwrap();
        assert_eq!(archive.len(), 2);
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        assert!(names.contains(&"001_one.svg".to_string()));
        assert!(names.contains(&"003_three.png".to_string()));
        assert_eq!(
            archive.by_name("003_three.png").unwrap().compression(),
            CompressionMethod::Stored
        );
    }

    #[test]
    fn archives_are_reproducible() {
        let results = vec![BatchItemResult {
            index: 0,
            name: "x".into(),
            status: BatchItemStatus::Success(artifact("x.png", "image/png")),
        }];
        let a = build_archive(&results, "t").unwrap();
        let b = build_archive(&results, "t").unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn outcome_and_summary() {
        let result = BatchResult {
            items: vec![BatchItemResult {
                index: 1,
                name: "bad".into(),
                status: BatchItemStatus::Failed {
                    kind: ErrorKind::WatermarkFailure,
                    message: "no glyphs".into(),
                },
            }],
            succeeded_count: 3,
            failed_count: 1,
            archive: None,
            cancelled: false,
        };
        assert!(matches!(
            result.outcome(),
            Err(ExportError::PartialBatchFailure { succeeded: 3, failed: 1 })
        ));
        let summary = result.summary();
        assert!(summary.starts_with("3 succeeded, 1 failed"));
        assert!(summary.contains("#2 bad: watermark failure: no glyphs"));
    }
}
