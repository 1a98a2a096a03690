//! Playwright integration for page captures.
//!
//! This module contains the inline capture script, error mapping,
//! and availability checks for Node.js and Playwright.

use crate::{Result, VauditError};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::process::last_json_line;

/// Full-page capture script. Prints `{status, image}` with a base64 PNG on
/// stdout; failures go to stderr as `{status: 'error', message}`.
pub(crate) const PLAYWRIGHT_SCRIPT: &str = r#"
const [, url, width, height, navTimeout, settleMs, headlessFlag] = process.argv;

async function run() {
  let browser;
  try {
    const { chromium } = require('playwright');
    browser = await chromium.launch({
      headless: headlessFlag !== '0',
      args: ['--no-sandbox', '--disable-setuid-sandbox']
    });
    const context = await browser.newContext({
      viewport: {
        width: parseInt(width, 10),
        height: parseInt(height, 10)
      }
    });
    const page = await context.newPage();

    await page.goto(url, { waitUntil: 'networkidle', timeout: parseInt(navTimeout, 10) });
    await page.waitForTimeout(parseInt(settleMs, 10));

    const buffer = await page.screenshot({ fullPage: true, type: 'png' });
    process.stdout.write(JSON.stringify({ status: 'ok', image: buffer.toString('base64') }));
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    console.error(JSON.stringify({ status: 'error', message }));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Stdout document of a successful capture.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct CaptureOutput {
    pub status: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error document written to stderr by the helper scripts.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ScriptError {
    pub status: String,
    pub message: String,
}

/// Maps a spawn error to an appropriate VauditError.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> VauditError {
    if err.kind() == io::ErrorKind::NotFound {
        VauditError::Capture(format!(
            "Unable to spawn Playwright helper; '{}' was not found on PATH",
            command
        ))
    } else {
        VauditError::Io(err)
    }
}

/// Maps Playwright stderr output to an appropriate VauditError.
pub(crate) fn map_playwright_error(status_text: impl Into<String>, stderr: &str) -> VauditError {
    if let Some(error) = last_json_line::<ScriptError>(stderr) {
        return map_playwright_status_error(&error.status, error.message);
    }

    let lower = stderr.to_ascii_lowercase();

    if lower.contains("cannot find module 'playwright'") {
        return VauditError::Capture(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
    }

    if lower.contains("timeout") {
        return VauditError::Capture(
            "Playwright timed out; raise capture.navigation_timeout or capture.process_timeout, and ensure the page finishes loading."
                .to_string(),
        );
    }

    VauditError::Capture(format!(
        "Playwright exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Maps a Playwright status error to an appropriate VauditError.
pub(crate) fn map_playwright_status_error(status: &str, message: String) -> VauditError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("cannot find module 'playwright'") {
        VauditError::Capture(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        )
    } else if lower.contains("executable doesn't exist") {
        VauditError::Capture(format!(
            "Playwright browser binaries are missing; run `npx playwright install chromium`. ({})",
            message.lines().next().unwrap_or_default()
        ))
    } else if lower.contains("timeout") {
        VauditError::Capture(format!(
            "Playwright error (status {}): {}. Hint: raise capture.navigation_timeout or capture.process_timeout, and ensure the page finishes loading.",
            status, message
        ))
    } else {
        VauditError::Capture(format!("Playwright error (status {}): {}", status, message))
    }
}

/// Ensures Node.js is available on the system.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            VauditError::Config(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                VauditError::Config(format!("Node command '{node_command}' was not found on PATH"))
            } else {
                VauditError::Io(err)
            }
        })?;

    if !status.success() {
        return Err(VauditError::Config(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            VauditError::Config(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_playwright_error(
            format!("{:?}", output.status),
            &stderr,
        ));
    }

    Ok(())
}
