//! Visual audit analysis.
//!
//! - `request` - builds the instruction text, images and response schema
//! - `client` - [`AnalysisBackend`] seam and the OpenAI-compatible client
//! - `report` - turns the raw analysis text into an [`AuditReport`](crate::types::AuditReport)

mod client;
mod report;
mod request;

pub use client::{perform_audit, AnalysisBackend, VisionClient, VisionClientConfig};
pub use report::normalize_report;
pub use request::{AuditRequest, InstructionLanguage};
