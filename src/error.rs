use crate::resource::ReferenceParseError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

#[derive(Debug, Error)]
pub enum VauditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid design reference: {0}")]
    Reference(#[from] ReferenceParseError),

    #[error("Figma API error (status: {status:?}): {message}")]
    FigmaApi {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("Performance audit failed: {0}")]
    Performance(String),

    #[error("Analysis request failed: {0}")]
    Analysis(String),

    #[error("Failed to parse analysis response: {0}")]
    AnalysisParse(String),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl VauditError {
    pub fn figma_api(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        VauditError::FigmaApi {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        VauditError::Validation(message.into())
    }

    pub fn analysis_parse(message: impl Into<String>) -> Self {
        VauditError::AnalysisParse(message.into())
    }

    /// Collapses any failure raised while capturing a page into a single
    /// `Capture` error, keeping the original text as the detail.
    pub fn into_capture(self) -> Self {
        match self {
            VauditError::Capture(_) => self,
            other => VauditError::Capture(other.to_string()),
        }
    }

    /// Same as [`VauditError::into_capture`] for the performance auditor.
    pub fn into_performance(self) -> Self {
        match self {
            VauditError::Performance(_) => self,
            other => VauditError::Performance(other.to_string()),
        }
    }

    /// Errors raised before any external service was contacted.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            VauditError::Validation(_) | VauditError::Reference(_) | VauditError::InvalidUrl(_)
        )
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            VauditError::Io(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check file paths/permissions.",
            ),
            VauditError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check connectivity/proxy/VPN and retry.",
            ),
            VauditError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Validation,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            VauditError::Validation(msg) => ErrorPayload::new(
                ErrorCategory::Validation,
                msg.to_string(),
                "Provide a Figma link with a token, a preview URL, or both.",
            ),
            VauditError::Reference(err) => {
                let remediation = match err {
                    ReferenceParseError::MissingNodeId { .. } => {
                        "Select a frame in Figma and copy its link so the URL includes ?node-id=..."
                    }
                    ReferenceParseError::MissingFileKey { .. } => {
                        "Use a Figma URL with a file key: https://www.figma.com/design/<FILE_KEY>/..."
                    }
                    ReferenceParseError::InvalidTarget { .. } => {
                        "Use an absolute http(s) URL for the preview (e.g., https://example.com)."
                    }
                };
                ErrorPayload::new(ErrorCategory::Reference, err.to_string(), remediation)
            }
            VauditError::FigmaApi { status, message } => ErrorPayload::new(
                ErrorCategory::Figma,
                format!("Figma API error (status {:?}): {}", status, message),
                "Check the Figma token/URL and rate limits; retry after waiting.",
            ),
            VauditError::Capture(msg) => {
                ErrorPayload::new(ErrorCategory::Capture, msg.to_string(), helper_hint(msg))
            }
            VauditError::Performance(msg) => ErrorPayload::new(
                ErrorCategory::Performance,
                msg.to_string(),
                helper_hint(msg),
            ),
            VauditError::Analysis(msg) => ErrorPayload::new(
                ErrorCategory::Analysis,
                msg.to_string(),
                "Check VAUDIT_VISION_API_KEY/endpoint/model and retry.",
            ),
            VauditError::AnalysisParse(msg) => ErrorPayload::new(
                ErrorCategory::Analysis,
                msg.to_string(),
                "The analysis service returned an unusable document; rerun the audit.",
            ),
            VauditError::Image(e) => ErrorPayload::new(
                ErrorCategory::Image,
                e.to_string(),
                "Verify the exported/captured image is a valid PNG.",
            ),
            VauditError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON/serialization inputs; run with --verbose for details.",
            ),
            VauditError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("figma_token") || lower.contains("figma token") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set FIGMA_TOKEN (or FIGMA_OAUTH_TOKEN) or pass --figma-token.",
                    )
                } else if lower.contains("api key") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Set VAUDIT_VISION_API_KEY (or OPENAI_API_KEY) before running audits.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/config file values (e.g., timeouts, --viewport WIDTHxHEIGHT).",
                    )
                }
            }
            VauditError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

fn helper_hint(msg: &str) -> &'static str {
    let lower = msg.to_ascii_lowercase();
    if lower.contains("playwright npm package is missing") {
        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`)."
    } else if lower.contains("lighthouse npm package is missing") {
        "Install the audit helpers (e.g., `npm install lighthouse chrome-launcher`)."
    } else if lower.contains("not found on path") || lower.contains("node command") {
        "Install Node.js and ensure the node binary is on PATH."
    } else if lower.contains("timeout") || lower.contains("timed out") {
        "Ensure the page finishes loading; raise capture.navigation_timeout or the process timeout in the config."
    } else {
        "Verify the preview URL is reachable from this machine."
    }
}

pub type Result<T> = std::result::Result<T, VauditError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Reference,
    Config,
    Network,
    Figma,
    Capture,
    Performance,
    Analysis,
    Image,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_payload_includes_playwright_remediation() {
        let err = VauditError::Capture(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Capture);
        let remediation = payload.remediation.unwrap_or_default();
        assert!(
            remediation.contains("npm install playwright"),
            "expected remediation to mention npm install playwright, got: {remediation}"
        );
    }

    #[test]
    fn performance_payload_includes_lighthouse_remediation() {
        let err = VauditError::Performance(
            "Lighthouse npm package is missing; install with `npm install lighthouse chrome-launcher`."
                .to_string(),
        );
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.contains("chrome-launcher"),
            "expected lighthouse remediation, got: {remediation}"
        );
    }

    #[test]
    fn timeout_messages_get_timeout_hint() {
        let err = VauditError::Capture("Playwright helper timed out after 75s".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(
            remediation.to_ascii_lowercase().contains("timeout"),
            "expected timeout remediation, got: {remediation}"
        );
    }

    #[test]
    fn missing_node_id_payload_mentions_node_id() {
        let err = VauditError::Reference(ReferenceParseError::MissingNodeId {
            url: "https://www.figma.com/design/ABC/x".to_string(),
        });
        let payload = err.to_payload();
        assert_eq!(payload.category, ErrorCategory::Reference);
        assert!(payload
            .remediation
            .unwrap_or_default()
            .contains("node-id"));
    }

    #[test]
    fn into_capture_wraps_foreign_errors_once() {
        let err = VauditError::Config("Unable to spawn Playwright helper".to_string()).into_capture();
        assert!(matches!(&err, VauditError::Capture(msg) if msg.contains("Unable to spawn")));

        let again = err.into_capture();
        assert_eq!(
            again.to_string(),
            "Capture failed: Configuration error: Unable to spawn Playwright helper"
        );
    }

    #[test]
    fn input_errors_are_classified() {
        assert!(VauditError::validation("nothing to do").is_input_error());
        assert!(!VauditError::Capture("boom".into()).is_input_error());
        assert!(!VauditError::analysis_parse("bad json").is_input_error());
    }

    #[test]
    fn config_payload_mentions_api_key_env() {
        let err = VauditError::Config("No analysis API key configured".to_string());
        let remediation = err.to_payload().remediation.unwrap_or_default();
        assert!(remediation.contains("VAUDIT_VISION_API_KEY"));
    }
}
