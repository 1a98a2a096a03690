//! Analysis backend: an OpenAI-compatible vision chat-completions endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::report::normalize_report;
use super::request::AuditRequest;
use crate::config::AnalysisConfig;
use crate::types::AuditReport;
use crate::{Result, VauditError};

/// Produces the raw analysis text for an audit request.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    async fn complete(&self, request: &AuditRequest) -> Result<String>;
}

/// Runs the backend and normalizes whatever it returned.
pub async fn perform_audit(
    backend: &dyn AnalysisBackend,
    request: &AuditRequest,
) -> Result<AuditReport> {
    let raw = backend.complete(request).await?;
    let report = normalize_report(&raw)?;
    info!(
        completion_score = report.completion_score(),
        total_issues = report.total_issues(),
        measured_performance = request.has_measured_performance(),
        "audit report produced"
    );
    Ok(report)
}

#[derive(Clone)]
pub struct VisionClientConfig {
    pub api_endpoint: String,
    pub api_key: String,
    /// Model to use (e.g., "gpt-4o")
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl std::fmt::Debug for VisionClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClientConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl VisionClientConfig {
    /// `None` when the configuration carries no API key. Environment
    /// overrides are applied to [`AnalysisConfig`] before this point.
    pub fn from_config(config: &AnalysisConfig) -> Option<Self> {
        let api_key = config.api_key.clone().filter(|key| !key.trim().is_empty())?;
        Some(Self {
            api_endpoint: config.api_endpoint.clone(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout: config.timeout,
        })
    }
}

pub struct VisionClient {
    config: VisionClientConfig,
    client: reqwest::Client,
}

impl VisionClient {
    pub fn new(config: VisionClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(VauditError::Network)?;
        Ok(Self { config, client })
    }

    pub fn from_config(config: &AnalysisConfig) -> Result<Option<Self>> {
        VisionClientConfig::from_config(config)
            .map(Self::new)
            .transpose()
    }

    pub fn config(&self) -> &VisionClientConfig {
        &self.config
    }

    fn payload(&self, request: &AuditRequest) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": request.instructions() },
                        {
                            "type": "image_url",
                            "image_url": { "url": request.design().image_data() }
                        },
                        {
                            "type": "image_url",
                            "image_url": { "url": request.implementation().image_data() }
                        }
                    ]
                }
            ],
            "max_tokens": self.config.max_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "audit_report",
                    "schema": request.response_schema()
                }
            }
        })
    }
}

impl std::fmt::Debug for VisionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionClient")
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct VisionApiResponse {
    #[serde(default)]
    choices: Vec<VisionChoice>,
}

#[derive(Debug, Deserialize)]
struct VisionChoice {
    message: VisionMessage,
}

#[derive(Debug, Deserialize)]
struct VisionMessage {
    content: Option<String>,
}

#[async_trait]
impl AnalysisBackend for VisionClient {
    async fn complete(&self, request: &AuditRequest) -> Result<String> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.config.api_endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(request))
            .send()
            .await
            .map_err(|e| VauditError::Analysis(format!("vision API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VauditError::Analysis(format!(
                "vision API returned {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        let resp: VisionApiResponse = response.json().await.map_err(|e| {
            VauditError::Analysis(format!("failed to parse vision API response: {e}"))
        })?;

        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| VauditError::Analysis("empty vision API response".to_string()))?;

        debug!(
            model = %self.config.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = content.len(),
            "vision API responded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_VISION_MODEL;
    use crate::types::fixtures::TINY_PNG;
    use crate::types::{CaptureArtifact, SourceKind};
    use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    fn request() -> AuditRequest {
        AuditRequest::new(
            CaptureArtifact::from_image_bytes(SourceKind::Design, TINY_PNG).unwrap(),
            CaptureArtifact::from_image_bytes(SourceKind::Implementation, TINY_PNG).unwrap(),
            None,
        )
        .unwrap()
    }

    #[derive(Clone, Default)]
    struct Upstream {
        seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
    }

    async fn chat(
        State(upstream): State<Upstream>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        upstream.seen.lock().unwrap().push((auth, body.clone()));

        if body["model"] == "broken" {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": {"message": "rate limited"}})),
            );
        }
        if body["model"] == "silent" {
            return (StatusCode::OK, Json(json!({"choices": []})));
        }
        let content = "```json\n{\"completionScore\": 81, \"rating\": \"B\", \"issues\": [{\"severity\": \"Minor\"}]}\n```";
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"content": content}}]})),
        )
    }

    async fn spawn_upstream() -> (String, Upstream) {
        let upstream = Upstream::default();
        let app = Router::new()
            .route("/v1/chat/completions", post(chat))
            .with_state(upstream.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
        (format!("http://{addr}/v1/chat/completions"), upstream)
    }

    fn client(endpoint: &str, model: &str) -> VisionClient {
        VisionClient::new(VisionClientConfig {
            api_endpoint: endpoint.to_string(),
            api_key: "sk-test".into(),
            model: model.into(),
            max_tokens: 512,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn sends_both_images_and_schema_then_normalizes() {
        let (endpoint, upstream) = spawn_upstream().await;
        let client = client(&endpoint, "gpt-4o");

        let report = perform_audit(&client, &request()).await.unwrap();
        assert_eq!(report.completion_score(), 81);
        assert_eq!(report.total_issues(), 1);

        let seen = upstream.seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        let content = body["messages"][0]["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["type"], "text");
        assert!(content[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["max_tokens"], 512);
    }

    #[tokio::test]
    async fn upstream_status_becomes_analysis_error() {
        let (endpoint, _) = spawn_upstream().await;
        let err = client(&endpoint, "broken")
            .complete(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, VauditError::Analysis(_)));
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn empty_choices_are_an_error() {
        let (endpoint, _) = spawn_upstream().await;
        let err = client(&endpoint, "silent")
            .complete(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty vision API response"));
    }

    #[test]
    fn config_requires_api_key() {
        let mut config = AnalysisConfig::default();
        assert!(VisionClientConfig::from_config(&config).is_none());

        config.api_key = Some("  ".into());
        assert!(VisionClientConfig::from_config(&config).is_none());

        config.api_key = Some("sk-live".into());
        let vision = VisionClientConfig::from_config(&config).unwrap();
        assert_eq!(vision.model, DEFAULT_VISION_MODEL);
        assert!(!format!("{vision:?}").contains("sk-live"));
    }
}
