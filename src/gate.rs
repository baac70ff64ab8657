//! Tier capability gate.
//!
//! Every check runs before any rendering, and all of them run: a request
//! that breaks several rules is rejected once, listing every [`Denial`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result};
use crate::request::{ColorProfile, ExportFormat, ExportRequest};

/// What a subscription tier permits. Resolved elsewhere; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapability {
    pub max_dpi: u32,
    pub allowed_formats: BTreeSet<ExportFormat>,
    pub watermark_required: bool,
    pub cmyk_allowed: bool,
    pub batch_allowed: bool,
}

impl TierCapability {
    /// PNG/JPEG at screen resolution, watermarked.
    pub fn free() -> Self {
        Self {
            max_dpi: 72,
            allowed_formats: [ExportFormat::RasterPng, ExportFormat::RasterJpeg].into_iter().collect(),
            watermark_required: true,
            cmyk_allowed: false,
            batch_allowed: false,
        }
    }

    /// Every format at print resolution, no watermark.
    pub fn pro() -> Self {
        Self {
            max_dpi: 300,
            allowed_formats: ExportFormat::ALL.into_iter().collect(),
            watermark_required: false,
            cmyk_allowed: false,
            batch_allowed: false,
        }
    }

    /// Pro plus CMYK output and batch export.
    pub fn business() -> Self {
        Self {
            cmyk_allowed: true,
            batch_allowed: true,
            ..Self::pro()
        }
    }

    /// Look up a preset by name (`free`, `pro`, `business`).
    pub fn preset(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::free()),
            "pro" => Ok(Self::pro()),
            "business" => Ok(Self::business()),
            other => Err(ExportError::invalid(format!("unknown tier '{other}'"))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| ExportError::invalid(format!("bad capability: {e}")))
    }
}

/// One reason a request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Denial {
    FormatNotAllowed { format: ExportFormat },
    DpiExceeded { requested: u32, max: u32 },
    CmykNotAllowed,
    BatchNotAllowed,
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Denial::FormatNotAllowed { format } => write!(f, "format {format} is not included in this tier"),
            Denial::DpiExceeded { requested, max } => {
                write!(f, "{requested} DPI exceeds the tier maximum of {max} DPI")
            }
            Denial::CmykNotAllowed => f.write_str("CMYK output is not included in this tier"),
            Denial::BatchNotAllowed => f.write_str("batch export is not included in this tier"),
        }
    }
}

/// Every rule `request` breaks under `capability`.
pub fn denials(request: &ExportRequest, capability: &TierCapability, batch: bool) -> Vec<Denial> {
    let mut out = Vec::new();
    if !capability.allowed_formats.contains(&request.format) {
        out.push(Denial::FormatNotAllowed { format: request.format });
    }
    let dpi = request.quality.dpi();
    if dpi > capability.max_dpi {
        out.push(Denial::DpiExceeded {
            requested: dpi,
            max: capability.max_dpi,
        });
    }
    if request.color_profile == ColorProfile::Cmyk && !capability.cmyk_allowed {
        out.push(Denial::CmykNotAllowed);
    }
    if batch && !capability.batch_allowed {
        out.push(Denial::BatchNotAllowed);
    }
    out
}

/// Reject `request` with [`ExportError::EntitlementDenied`] if any rule fails.
pub fn check(request: &ExportRequest, capability: &TierCapability, batch: bool) -> Result<()> {
    let denied = denials(request, capability, batch);
    if denied.is_empty() {
        return Ok(());
    }
    for d in &denied {
        log::info!("export denied: {d}");
    }
    Err(ExportError::EntitlementDenied(denied))
}

/// Source of resolved capabilities, usually backed by a subscription service.
pub trait CapabilityResolver {
    fn resolve_capability(&self, user_id: &str) -> Result<TierCapability>;
}

/// Fixed user → capability table. Unknown users get the fallback.
#[derive(Debug, Clone)]
pub struct StaticCapabilities {
    users: HashMap<String, TierCapability>,
    fallback: TierCapability,
}

impl Default for StaticCapabilities {
    fn default() -> Self {
        Self::new(TierCapability::free())
    }
}

impl StaticCapabilities {
    pub fn new(fallback: TierCapability) -> Self {
        Self {
            users: HashMap::new(),
            fallback,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, capability: TierCapability) -> Self {
        self.users.insert(user_id.into(), capability);
        self
    }
}

impl CapabilityResolver for StaticCapabilities {
    fn resolve_capability(&self, user_id: &str) -> Result<TierCapability> {
        Ok(self.users.get(user_id).cloned().unwrap_or_else(|| self.fallback.clone()))
    }
}
