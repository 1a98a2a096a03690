//! VisionAudit (vaudit) Library
//!
//! Acquires the inputs of a visual design audit and turns the analysis of
//! those inputs into a canonical report: a design frame exported from Figma,
//! a full-page screenshot of the implementation (via Playwright) and a
//! Lighthouse performance measurement of the same page.
//!
//! # Module Overview
//!
//! - [`resource`] - Figma link and preview URL parsing
//! - [`figma_client`] - Figma image export API
//! - [`browser`] - Page capture and performance audits through Node.js helpers
//! - [`acquisition`] - Concurrent orchestration of the three sources
//! - [`analysis`] - Audit request builder, vision client and report normalizer
//! - [`server`] - HTTP endpoints used by the dashboard
//! - [`config`] - Configuration file and environment support
//! - [`types`] - Core data types and structures
//! - [`output`] - JSON output schemas for the CLI
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaudit_lib::{
//!     AcquisitionOrchestrator, AcquisitionRequest, AuditorOptions, CaptureOptions, FigmaAuth,
//!     FigmaClient, PageCapturer, PerformanceAuditor,
//! };
//!
//! # async fn example() -> vaudit_lib::Result<()> {
//! let orchestrator = AcquisitionOrchestrator::new(
//!     Arc::new(FigmaClient::new()?),
//!     Arc::new(PageCapturer::new(CaptureOptions::default())),
//!     Arc::new(PerformanceAuditor::new(AuditorOptions::default())),
//! );
//!
//! let request = AcquisitionRequest::new()
//!     .with_design("https://www.figma.com/design/KEY/Landing?node-id=1-2", FigmaAuth::from_env())
//!     .with_preview("https://example.com");
//! let result = orchestrator.acquire(&request).await?;
//! println!("comparable: {}", result.is_comparable());
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod analysis;
pub mod browser;
pub mod config;
pub mod error;
pub mod figma_client;
pub mod output;
pub mod resource;
pub mod server;
pub mod types;
pub mod viewport;

pub use acquisition::{
    parse_target, AcquisitionOrchestrator, AcquisitionPlan, AcquisitionRequest, DesignSource,
    PageCapture, PerformanceProbe, PERFORMANCE_SKIPPED,
};
pub use analysis::{
    normalize_report, perform_audit, AnalysisBackend, AuditRequest, InstructionLanguage,
    VisionClient, VisionClientConfig,
};
pub use browser::{
    AuditorOptions, CaptureOptions, PageCapturer, PerformanceAuditor, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT, SETTLE_DELAY,
};
pub use config::{Config, ConfigError};
pub use error::{ErrorCategory, ErrorPayload, Result, VauditError};
pub use figma_client::{FigmaAuth, FigmaClient, ImageExportOptions};
pub use output::{Inputs, VauditOutput, VAUDIT_OUTPUT_VERSION};
pub use resource::{parse_design_reference, parse_design_url, parse_target_url, ReferenceParseError};
pub use server::{build_router, serve, AppState};
pub use types::{
    AcquisitionResult, AcquisitionSource, AuditIssue, AuditReport, CaptureArtifact,
    DesignReference, IssueCategory, IssueLocation, PerformanceMetrics, PerformanceTimings,
    ReportMetrics, Severity, SourceError, SourceKind,
};
pub use viewport::Viewport;
