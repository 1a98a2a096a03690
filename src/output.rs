//! Versioned JSON envelopes printed by the CLI.

use crate::error::ErrorPayload;
use crate::types::{AcquisitionResult, AuditReport, PerformanceMetrics, SourceError, Viewport};
use serde::Serialize;

/// Schema version for output payloads.
pub const VAUDIT_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum VauditOutput {
    Acquire(AcquireOutput),
    Audit(AuditOutput),
    Error(ErrorOutput),
}

/// What the run was asked to fetch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figma_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub viewport: Viewport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireOutput {
    pub version: String,
    pub inputs: Inputs,
    #[serde(flatten)]
    pub result: AcquisitionResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutput {
    pub version: String,
    pub inputs: Inputs,
    /// Measured data the report was based on; absent when estimated.
    pub performance: Option<PerformanceMetrics>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acquisition_errors: Vec<SourceError>,
    pub report: AuditReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

impl VauditOutput {
    pub fn acquire(inputs: Inputs, result: AcquisitionResult) -> Self {
        Self::Acquire(AcquireOutput {
            version: VAUDIT_OUTPUT_VERSION.to_string(),
            inputs,
            result,
        })
    }

    pub fn error(error: ErrorPayload) -> Self {
        Self::Error(ErrorOutput {
            version: VAUDIT_OUTPUT_VERSION.to_string(),
            message: Some(error.message.clone()),
            error,
        })
    }
}
