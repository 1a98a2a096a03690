//! Acquisition data model.
//!
//! - [`DesignReference`] - a (file key, node id) pair parsed from a Figma link
//! - [`CaptureArtifact`] - an encoded raster image from Figma or the browser
//! - [`PerformanceMetrics`] - the Lighthouse subset kept for an audit
//! - [`AcquisitionResult`] - the envelope produced by the orchestrator

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::{Result, VauditError};

/// Which side of the comparison an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Exported from the design file
    Design,
    /// Rendered from the running implementation
    Implementation,
}

/// Identifies one frame inside a Figma file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignReference {
    pub file_key: String,
    /// Node id in the export API's `12:34` form.
    pub node_id: Option<String>,
}

/// An encoded raster image owned by a single request.
///
/// Artifacts are immutable: the only way to build one is from validated
/// image bytes, and there is no way to mutate it afterwards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureArtifact {
    image_data: String,
    source_kind: SourceKind,
    captured_at: DateTime<Utc>,
    width: u32,
    height: u32,
}

impl CaptureArtifact {
    /// Validates `bytes` as a PNG or JPEG, reads its dimensions and encodes it
    /// as a data URI.
    pub fn from_image_bytes(source_kind: SourceKind, bytes: &[u8]) -> Result<Self> {
        let format = image::guess_format(bytes)?;
        let mime = match format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            other => {
                return Err(VauditError::validation(format!(
                    "unsupported image format {:?}; expected PNG or JPEG",
                    other
                )))
            }
        };

        let (width, height) = image::io::Reader::with_format(Cursor::new(bytes), format)
            .into_dimensions()?;

        Ok(Self {
            image_data: format!("data:{mime};base64,{}", BASE64_STANDARD.encode(bytes)),
            source_kind,
            captured_at: Utc::now(),
            width,
            height,
        })
    }

    /// Rebuilds an artifact from a `data:image/...;base64,` URI, e.g. one that
    /// a client received from `/api/audit-setup` and posts back for analysis.
    pub fn from_data_uri(source_kind: SourceKind, uri: &str) -> Result<Self> {
        let payload = uri
            .trim()
            .strip_prefix("data:")
            .and_then(|rest| rest.split_once(";base64,"))
            .map(|(_, data)| data)
            .ok_or_else(|| {
                VauditError::validation("image must be a base64 data URI (data:image/png;base64,...)")
            })?;
        let bytes = BASE64_STANDARD
            .decode(payload)
            .map_err(|e| VauditError::validation(format!("invalid base64 image payload: {e}")))?;
        Self::from_image_bytes(source_kind, &bytes)
    }

    /// The full `data:` URI.
    pub fn image_data(&self) -> &str {
        &self.image_data
    }

    /// MIME type recorded in the data URI.
    pub fn mime_type(&self) -> &str {
        self.image_data
            .strip_prefix("data:")
            .and_then(|rest| rest.split(';').next())
            .unwrap_or("image/png")
    }

    /// The base64 payload without the `data:...;base64,` prefix.
    pub fn base64_payload(&self) -> &str {
        self.image_data
            .split_once(',')
            .map(|(_, data)| data)
            .unwrap_or_default()
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Consumes the artifact, returning its data URI.
    pub fn into_data_uri(self) -> String {
        self.image_data
    }
}

/// Lighthouse performance subset. Absence of this value means "not measured".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    /// Performance category score, 0-100.
    pub score: u8,
    pub metrics: PerformanceTimings,
}

/// Display values exactly as the auditor formatted them (e.g. "1.2 s").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceTimings {
    #[serde(rename = "fcp")]
    pub first_contentful_paint: String,
    #[serde(rename = "lcp")]
    pub largest_contentful_paint: String,
    #[serde(rename = "cls")]
    pub cumulative_layout_shift: String,
    #[serde(rename = "tbt")]
    pub total_blocking_time: String,
}

/// One acquisition source, in the order errors are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionSource {
    Design,
    Capture,
    Performance,
}

impl std::fmt::Display for AcquisitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Design => write!(f, "design export"),
            Self::Capture => write!(f, "page capture"),
            Self::Performance => write!(f, "performance audit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: AcquisitionSource,
    pub message: String,
}

impl SourceError {
    pub fn new(source: AcquisitionSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

/// Merged outcome of one acquisition. Any field may be empty; `errors`
/// explains every requested source that did not produce a value.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquisitionResult {
    pub design_artifact: Option<CaptureArtifact>,
    pub implementation_artifact: Option<CaptureArtifact>,
    pub performance: Option<PerformanceMetrics>,
    pub errors: Vec<SourceError>,
}

impl AcquisitionResult {
    /// True when neither comparison artifact was obtained.
    pub fn has_no_artifacts(&self) -> bool {
        self.design_artifact.is_none() && self.implementation_artifact.is_none()
    }

    /// True when both artifacts needed for an analysis are present.
    pub fn is_comparable(&self) -> bool {
        self.design_artifact.is_some() && self.implementation_artifact.is_some()
    }

    /// Human-readable summary of every recorded failure.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.source, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}
