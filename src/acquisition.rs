//! Acquisition orchestration.
//!
//! One request names a design reference, an implementation URL, or both.
//! The design export and the capture→performance chain run concurrently and
//! are joined before the result is returned. A failing source never cancels
//! or taints another: its error is recorded in [`AcquisitionResult::errors`]
//! and the corresponding field stays empty.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{PageCapturer, PerformanceAuditor};
use crate::config::Config;
use crate::figma_client::FigmaAuth;
use crate::resource::{parse_design_reference, parse_target_url};
use crate::types::{
    AcquisitionResult, AcquisitionSource, CaptureArtifact, DesignReference, PerformanceMetrics,
    SourceError,
};
use crate::{Result, VauditError};

/// Recorded when the performance audit is not attempted.
pub const PERFORMANCE_SKIPPED: &str = "skipped because page capture failed";

/// Renders one design node to an image.
#[async_trait]
pub trait DesignSource: Send + Sync {
    async fn export(
        &self,
        reference: &DesignReference,
        auth: &FigmaAuth,
    ) -> Result<CaptureArtifact>;
}

/// Renders a live page to a full-page image.
#[async_trait]
pub trait PageCapture: Send + Sync {
    async fn capture(&self, url: &Url) -> Result<CaptureArtifact>;
}

/// Measures page performance.
#[async_trait]
pub trait PerformanceProbe: Send + Sync {
    async fn audit(&self, url: &Url) -> Result<PerformanceMetrics>;
}

/// Inputs of one acquisition. Blank strings count as absent.
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub figma_url: Option<String>,
    pub figma_auth: Option<FigmaAuth>,
    pub preview_url: Option<String>,
    /// Run the performance audit after a successful capture.
    pub measure_performance: bool,
}

impl Default for AcquisitionRequest {
    fn default() -> Self {
        Self {
            figma_url: None,
            figma_auth: None,
            preview_url: None,
            measure_performance: true,
        }
    }
}

impl AcquisitionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_design(mut self, figma_url: impl Into<String>, auth: Option<FigmaAuth>) -> Self {
        self.figma_url = Some(figma_url.into());
        self.figma_auth = auth;
        self
    }

    pub fn with_preview(mut self, preview_url: impl Into<String>) -> Self {
        self.preview_url = Some(preview_url.into());
        self
    }

    pub fn without_performance(mut self) -> Self {
        self.measure_performance = false;
        self
    }

    /// Checks the request without contacting any external service.
    pub fn validate(&self) -> Result<AcquisitionPlan> {
        let figma_url = non_blank(&self.figma_url);
        let preview_url = non_blank(&self.preview_url);

        if figma_url.is_none() && preview_url.is_none() {
            return Err(VauditError::validation(
                "nothing to acquire: provide a Figma URL, a preview URL, or both",
            ));
        }

        let design = match figma_url {
            Some(raw) => {
                let auth = self.figma_auth.clone().ok_or_else(|| {
                    VauditError::validation("a Figma token is required to export the design")
                })?;
                Some((parse_design_reference(raw)?, auth))
            }
            None => None,
        };

        let target = preview_url.map(parse_target).transpose()?;

        Ok(AcquisitionPlan {
            design,
            target,
            measure_performance: self.measure_performance,
        })
    }
}

/// A validated request: every reference parsed, nothing fetched yet.
#[derive(Debug, Clone)]
pub struct AcquisitionPlan {
    pub design: Option<(DesignReference, FigmaAuth)>,
    pub target: Option<Url>,
    pub measure_performance: bool,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Implementation URLs that fail to parse are plain validation errors.
pub fn parse_target(raw: &str) -> Result<Url> {
    parse_target_url(raw).map_err(|e| VauditError::Validation(e.to_string()))
}

/// Coordinates the design exporter, page capturer and performance auditor.
#[derive(Clone)]
pub struct AcquisitionOrchestrator {
    design: Arc<dyn DesignSource>,
    capture: Arc<dyn PageCapture>,
    performance: Arc<dyn PerformanceProbe>,
}

impl std::fmt::Debug for AcquisitionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionOrchestrator").finish_non_exhaustive()
    }
}

impl AcquisitionOrchestrator {
    pub fn new(
        design: Arc<dyn DesignSource>,
        capture: Arc<dyn PageCapture>,
        performance: Arc<dyn PerformanceProbe>,
    ) -> Self {
        Self {
            design,
            capture,
            performance,
        }
    }

    /// Figma client, Playwright capturer and Lighthouse auditor built from
    /// the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Arc::new(config.figma_client()?),
            Arc::new(PageCapturer::new(config.capture_options())),
            Arc::new(PerformanceAuditor::new(config.auditor_options())),
        ))
    }

    /// Runs every requested source and merges the outcomes.
    ///
    /// Fails only when the request itself is invalid; source failures are
    /// reported inside the result.
    pub async fn acquire(&self, request: &AcquisitionRequest) -> Result<AcquisitionResult> {
        let plan = request.validate()?;
        Ok(self.run(plan).await)
    }

    async fn run(&self, plan: AcquisitionPlan) -> AcquisitionResult {
        let started = Instant::now();
        let AcquisitionPlan {
            design,
            target,
            measure_performance,
        } = plan;

        let design_branch = async {
            match &design {
                Some((reference, auth)) => Some(self.design.export(reference, auth).await),
                None => None,
            }
        };

        let implementation_branch = async {
            let url = target.as_ref()?;
            let captured = self.capture.capture(url).await;
            let performance = match (&captured, measure_performance) {
                (Ok(_), true) => Some(self.performance.audit(url).await),
                (Ok(_), false) => None,
                (Err(_), _) if measure_performance => {
                    Some(Err(VauditError::Performance(PERFORMANCE_SKIPPED.to_string())))
                }
                (Err(_), _) => None,
            };
            Some((captured, performance))
        };

        let (design_outcome, implementation_outcome) =
            tokio::join!(design_branch, implementation_branch);

        let mut result = AcquisitionResult::default();

        if let Some(outcome) = design_outcome {
            result.design_artifact = record(&mut result.errors, AcquisitionSource::Design, outcome);
        }

        if let Some((captured, performance)) = implementation_outcome {
            result.implementation_artifact =
                record(&mut result.errors, AcquisitionSource::Capture, captured);
            if let Some(outcome) = performance {
                result.performance =
                    record(&mut result.errors, AcquisitionSource::Performance, outcome);
            }
        }

        info!(
            design = result.design_artifact.is_some(),
            implementation = result.implementation_artifact.is_some(),
            performance = result.performance.is_some(),
            failures = result.errors.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "acquisition finished"
        );
        result
    }

    /// Exports a single design node.
    pub async fn export_design(
        &self,
        figma_url: &str,
        auth: Option<FigmaAuth>,
    ) -> Result<CaptureArtifact> {
        let auth = auth.ok_or_else(|| {
            VauditError::validation("a Figma token is required to export the design")
        })?;
        let reference = parse_design_reference(figma_url)?;
        debug!(file_key = %reference.file_key, "exporting design node");
        self.design.export(&reference, &auth).await
    }

    /// Captures a single page.
    pub async fn capture_page(&self, preview_url: &str) -> Result<CaptureArtifact> {
        let url = parse_target(preview_url)?;
        self.capture.capture(&url).await
    }

    /// Audits a single page.
    pub async fn measure_performance(&self, preview_url: &str) -> Result<PerformanceMetrics> {
        let url = parse_target(preview_url)?;
        self.performance.audit(&url).await
    }
}

fn record<T>(
    errors: &mut Vec<SourceError>,
    source: AcquisitionSource,
    outcome: Result<T>,
) -> Option<T> {
    match outcome {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(source = %source, error = %err, "acquisition source failed");
            errors.push(SourceError::new(source, err.to_string()));
            None
        }
    }
}
