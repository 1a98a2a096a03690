//! Data types shared by the acquisition pipeline, the analysis layer and the
//! HTTP surface.

mod core;
mod report;

pub use self::core::{
    AcquisitionResult, AcquisitionSource, CaptureArtifact, DesignReference, PerformanceMetrics,
    PerformanceTimings, SourceError, SourceKind,
};
pub use report::{
    AuditIssue, AuditReport, IssueCategory, IssueLocation, ReportMetrics, Severity, UNAVAILABLE,
};
pub use crate::viewport::Viewport;

#[cfg(test)]
pub(crate) use self::core::fixtures;
