//! Page capturer for implementation screenshots.
//!
//! Each capture launches its own Playwright helper (and therefore its own
//! browser). A semaphore bounds how many helpers run at once.

use crate::acquisition::PageCapture;
use crate::types::{CaptureArtifact, SourceKind};
use crate::{Result, VauditError, Viewport};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::playwright::{
    ensure_node_available, ensure_playwright_available, map_playwright_error,
    map_playwright_status_error, map_spawn_error, CaptureOutput, PLAYWRIGHT_SCRIPT,
};
use super::process::{run_helper, timed_out_message, HelperFailure};

/// Default timeout for page navigation (network idle included).
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause after network idle so animations can settle. Not configurable.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default timeout for the entire Playwright process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(90);

/// Configuration options for page captures.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    /// Viewport dimensions for the browser context.
    pub viewport: Viewport,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Timeout for page navigation.
    pub navigation_timeout: Duration,
    /// Timeout for the entire Playwright process.
    pub process_timeout: Duration,
    /// Maximum number of concurrent capture helpers.
    pub max_concurrent_sessions: usize,
    /// Skip the Node/Playwright pre-flight checks.
    pub skip_preflight: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            viewport: Viewport::default(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            max_concurrent_sessions: 4,
            skip_preflight: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageCapturer {
    options: CaptureOptions,
    semaphore: Arc<Semaphore>,
}

impl PageCapturer {
    pub fn new(options: CaptureOptions) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Renders `url` and returns a full-page implementation artifact. Every
    /// failure is reported as [`VauditError::Capture`].
    pub async fn capture_url(&self, url: &Url) -> Result<CaptureArtifact> {
        self.try_capture(url).await.map_err(VauditError::into_capture)
    }

    async fn try_capture(&self, url: &Url) -> Result<CaptureArtifact> {
        if !self.options.skip_preflight {
            // Fail fast if Node is missing to avoid spawning Playwright unnecessarily.
            ensure_node_available(&self.options.node_command).await?;
            ensure_playwright_available(&self.options.node_command).await?;
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| VauditError::Capture("page capturer unavailable".to_string()))?;

        let mut cmd = Command::new(&self.options.node_command);
        cmd.arg("-e")
            .arg(PLAYWRIGHT_SCRIPT)
            .arg(url.as_str())
            .arg(self.options.viewport.width.to_string())
            .arg(self.options.viewport.height.to_string())
            .arg(self.options.navigation_timeout.as_millis().to_string())
            .arg(SETTLE_DELAY.as_millis().to_string())
            .arg(if self.options.headless { "1" } else { "0" });

        debug!(url = %url, viewport = %self.options.viewport, "launching capture helper");
        let output = run_helper(cmd, self.options.process_timeout)
            .await
            .map_err(|failure| match failure {
                HelperFailure::Spawn(err) => map_spawn_error(err, &self.options.node_command),
                HelperFailure::Wait(err) => VauditError::Io(err),
                HelperFailure::TimedOut(limit) => {
                    VauditError::Capture(timed_out_message("Playwright", limit))
                }
            })?;

        if !output.status.success() {
            return Err(map_playwright_error(
                output.status.to_string(),
                &output.stderr_text(),
            ));
        }

        let artifact = parse_capture_output(&output.stdout_text())?;
        let (width, height) = artifact.dimensions();
        info!(
            url = %url,
            width,
            height,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "page captured"
        );
        Ok(artifact)
    }
}

#[async_trait]
impl PageCapture for PageCapturer {
    async fn capture(&self, url: &Url) -> Result<CaptureArtifact> {
        self.capture_url(url).await
    }
}

/// Decodes the helper's stdout document into an implementation artifact.
pub(crate) fn parse_capture_output(stdout: &str) -> Result<CaptureArtifact> {
    let payload: CaptureOutput = serde_json::from_str(stdout.trim()).map_err(|e| {
        VauditError::Capture(format!(
            "Failed to parse Playwright output: {} - raw: {}",
            e,
            truncate(stdout.trim(), 200)
        ))
    })?;

    if payload.status != "ok" {
        return Err(map_playwright_status_error(
            &payload.status,
            payload
                .message
                .unwrap_or_else(|| "no additional details".to_string()),
        ));
    }

    let encoded = payload.image.ok_or_else(|| {
        VauditError::Capture("Playwright returned ok status but no image".to_string())
    })?;
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| VauditError::Capture(format!("invalid screenshot encoding: {e}")))?;

    CaptureArtifact::from_image_bytes(SourceKind::Implementation, &bytes)
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
