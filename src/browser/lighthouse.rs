//! Performance audits through Lighthouse.
//!
//! The helper launches a dedicated Chrome with chrome-launcher, runs a
//! performance-only pass and prints the Lighthouse result document. Metric
//! extraction happens here so that the report shape is checked in Rust.

use crate::acquisition::PerformanceProbe;
use crate::types::{PerformanceMetrics, PerformanceTimings};
use crate::{Result, VauditError};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use url::Url;

use super::playwright::{ensure_node_available, ScriptError, NODE_CHECK_TIMEOUT};
use super::process::{last_json_line, run_helper, timed_out_message, HelperFailure};

/// Default timeout for the entire Lighthouse process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(120);

/// Both packages are ESM-only in current releases, hence `import()`.
/// chrome-launcher detaches Chrome, so its pid is announced on stderr and a
/// SIGTERM closes it before exiting.
pub(crate) const LIGHTHOUSE_SCRIPT: &str = r#"
const [, url, flagsJson] = process.argv;
let chrome;

process.once('SIGTERM', async () => {
  if (chrome) {
    try { await chrome.kill(); } catch (_) {}
  }
  process.exit(143);
});

async function run() {
  try {
    const chromeLauncher = await import('chrome-launcher');
    const { default: lighthouse } = await import('lighthouse');
    chrome = await chromeLauncher.launch({ chromeFlags: JSON.parse(flagsJson) });
    console.error(JSON.stringify({ event: 'browser', pid: chrome.pid }));
    const result = await lighthouse(url, {
      logLevel: 'error',
      output: 'json',
      onlyCategories: ['performance'],
      port: chrome.port
    });
    if (!result || !result.lhr) {
      throw new Error('Lighthouse produced no result');
    }
    const { categories, audits, runtimeError } = result.lhr;
    process.stdout.write(JSON.stringify({ status: 'ok', lhr: { categories, audits, runtimeError } }));
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (chrome) {
      await chrome.kill();
    }
  }
}

run();
"#;

const LIGHTHOUSE_CHECK_SCRIPT: &str =
    "Promise.all([import('lighthouse'), import('chrome-launcher')]).then(() => process.stdout.write('ok'), (e) => { console.error(e && e.message ? e.message : String(e)); process.exit(1); });";

/// Audit ids extracted from the report, in wire order.
const FCP: &str = "first-contentful-paint";
const LCP: &str = "largest-contentful-paint";
const CLS: &str = "cumulative-layout-shift";
const TBT: &str = "total-blocking-time";

#[derive(Debug, Clone)]
pub struct AuditorOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    /// Flags passed to the dedicated Chrome instance.
    pub chrome_flags: Vec<String>,
    /// Timeout for the entire Lighthouse process.
    pub process_timeout: Duration,
    /// Maximum number of concurrent audits.
    pub max_concurrent_sessions: usize,
    /// Skip the Node/Lighthouse pre-flight checks.
    pub skip_preflight: bool,
}

impl Default for AuditorOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            chrome_flags: vec!["--headless".to_string(), "--no-sandbox".to_string()],
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            max_concurrent_sessions: 2,
            skip_preflight: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PerformanceAuditor {
    options: AuditorOptions,
    semaphore: Arc<Semaphore>,
}

impl PerformanceAuditor {
    pub fn new(options: AuditorOptions) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn options(&self) -> &AuditorOptions {
        &self.options
    }

    /// Audits `url`. Every failure is reported as [`VauditError::Performance`].
    pub async fn audit_url(&self, url: &Url) -> Result<PerformanceMetrics> {
        self.try_audit(url)
            .await
            .map_err(VauditError::into_performance)
    }

    async fn try_audit(&self, url: &Url) -> Result<PerformanceMetrics> {
        if !self.options.skip_preflight {
            ensure_node_available(&self.options.node_command).await?;
            ensure_lighthouse_available(&self.options.node_command).await?;
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| VauditError::Performance("performance auditor unavailable".into()))?;

        let flags = serde_json::to_string(&self.options.chrome_flags)?;
        let mut cmd = Command::new(&self.options.node_command);
        cmd.arg("-e").arg(LIGHTHOUSE_SCRIPT).arg(url.as_str()).arg(flags);

        debug!(url = %url, "launching lighthouse helper");
        let output = run_helper(cmd, self.options.process_timeout)
            .await
            .map_err(|failure| match failure {
                HelperFailure::Spawn(err) => map_spawn_error(err, &self.options.node_command),
                HelperFailure::Wait(err) => VauditError::Io(err),
                HelperFailure::TimedOut(limit) => {
                    VauditError::Performance(timed_out_message("Lighthouse", limit))
                }
            })?;

        if !output.status.success() {
            return Err(map_lighthouse_error(
                output.status.to_string(),
                &output.stderr_text(),
            ));
        }

        let metrics = parse_lighthouse_output(&output.stdout_text())?;
        info!(
            url = %url,
            score = metrics.score,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "performance audit finished"
        );
        Ok(metrics)
    }
}

#[async_trait]
impl PerformanceProbe for PerformanceAuditor {
    async fn audit(&self, url: &Url) -> Result<PerformanceMetrics> {
        self.audit_url(url).await
    }
}

#[derive(Debug, Deserialize)]
struct HelperDocument {
    status: String,
    #[serde(default)]
    lhr: Option<LighthouseResult>,
    #[serde(default)]
    message: Option<String>,
}

/// The subset of a Lighthouse result used for metrics.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseResult {
    #[serde(default)]
    pub categories: HashMap<String, LighthouseCategory>,
    #[serde(default)]
    pub audits: HashMap<String, LighthouseAudit>,
    #[serde(default)]
    pub runtime_error: Option<RuntimeError>,
}

#[derive(Debug, Deserialize)]
pub struct LighthouseCategory {
    /// 0.0-1.0, null when the category could not be scored.
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseAudit {
    #[serde(default)]
    pub display_value: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RuntimeError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LighthouseResult {
    /// Extracts the score and the four timing display values.
    pub fn to_metrics(&self) -> Result<PerformanceMetrics> {
        if let Some(err) = &self.runtime_error {
            return Err(VauditError::Performance(format!(
                "Lighthouse runtime error {}: {}",
                err.code.as_deref().unwrap_or("UNKNOWN"),
                err.message.as_deref().unwrap_or("no details")
            )));
        }

        let raw_score = self
            .categories
            .get("performance")
            .and_then(|c| c.score)
            .ok_or_else(|| {
                VauditError::Performance("Lighthouse report has no performance score".into())
            })?;

        let display = |id: &str| -> Result<String> {
            self.audits
                .get(id)
                .and_then(|a| a.display_value.clone())
                .ok_or_else(|| {
                    VauditError::Performance(format!("Lighthouse report is missing the {id} audit"))
                })
        };

        Ok(PerformanceMetrics {
            score: scale_score(raw_score),
            metrics: PerformanceTimings {
                first_contentful_paint: display(FCP)?,
                largest_contentful_paint: display(LCP)?,
                cumulative_layout_shift: display(CLS)?,
                total_blocking_time: display(TBT)?,
            },
        })
    }
}

fn scale_score(raw: f64) -> u8 {
    (raw * 100.0).round().clamp(0.0, 100.0) as u8
}

pub(crate) fn parse_lighthouse_output(stdout: &str) -> Result<PerformanceMetrics> {
    let doc: HelperDocument = serde_json::from_str(stdout.trim()).map_err(|e| {
        VauditError::Performance(format!("Failed to parse Lighthouse output: {e}"))
    })?;

    if doc.status != "ok" {
        return Err(map_lighthouse_message(
            doc.message.as_deref().unwrap_or("no additional details"),
        ));
    }

    doc.lhr
        .ok_or_else(|| VauditError::Performance("Lighthouse returned ok status but no report".into()))?
        .to_metrics()
}

pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> VauditError {
    if err.kind() == io::ErrorKind::NotFound {
        VauditError::Performance(format!(
            "Unable to spawn Lighthouse helper; '{}' was not found on PATH",
            command
        ))
    } else {
        VauditError::Io(err)
    }
}

fn is_missing_package(lower: &str) -> bool {
    (lower.contains("cannot find package") || lower.contains("cannot find module"))
        && (lower.contains("'lighthouse'") || lower.contains("'chrome-launcher'"))
}

fn map_lighthouse_message(message: &str) -> VauditError {
    let lower = message.to_ascii_lowercase();
    if is_missing_package(&lower) {
        VauditError::Performance(
            "Lighthouse npm package is missing; install with `npm install lighthouse chrome-launcher`."
                .to_string(),
        )
    } else if lower.contains("no chrome installations found") {
        VauditError::Performance(format!(
            "{message}. Hint: install Chrome or set CHROME_PATH for chrome-launcher."
        ))
    } else {
        VauditError::Performance(format!("Lighthouse error: {message}"))
    }
}

pub(crate) fn map_lighthouse_error(status_text: impl Into<String>, stderr: &str) -> VauditError {
    if let Some(error) = last_json_line::<ScriptError>(stderr) {
        return map_lighthouse_message(&error.message);
    }

    let lower = stderr.to_ascii_lowercase();
    if is_missing_package(&lower) {
        return map_lighthouse_message(stderr);
    }

    VauditError::Performance(format!(
        "Lighthouse exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Ensures the lighthouse and chrome-launcher npm packages can be imported.
pub(crate) async fn ensure_lighthouse_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(LIGHTHOUSE_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            VauditError::Config(format!(
                "Timed out checking Lighthouse availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_lighthouse_error(format!("{:?}", output.status), &stderr));
    }

    Ok(())
}
