use crate::acquisition::DesignSource;
use crate::error::{Result, VauditError};
use crate::types::{CaptureArtifact, DesignReference, SourceKind};
use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.figma.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Captures travel as PNG data URIs, so exports are always PNG.
const EXPORT_FORMAT: &str = "png";

#[derive(Debug, Clone)]
pub enum FigmaAuth {
    PersonalAccessToken(String),
    OAuthToken(String),
}

impl FigmaAuth {
    pub fn from_env() -> Option<Self> {
        if let Ok(token) = std::env::var("FIGMA_TOKEN") {
            if !token.is_empty() {
                return Some(Self::PersonalAccessToken(token));
            }
        }

        if let Ok(token) = std::env::var("FIGMA_OAUTH_TOKEN") {
            if !token.is_empty() {
                return Some(Self::OAuthToken(token));
            }
        }

        None
    }

    /// Token as supplied in a request body. Blank tokens count as absent.
    pub fn from_token(token: Option<&str>) -> Option<Self> {
        token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| Self::PersonalAccessToken(t.to_string()))
    }

    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            FigmaAuth::PersonalAccessToken(token) => builder.header("X-Figma-Token", token),
            FigmaAuth::OAuthToken(token) => builder.bearer_auth(token),
        }
    }
}

/// Client for the Figma image export API.
///
/// Credentials are supplied per call because each audit request may carry
/// its own token.
#[derive(Debug, Clone)]
pub struct FigmaClient {
    http: Client,
    base_url: Url,
    options: ImageExportOptions,
}

impl FigmaClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url_and_timeout(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_base_url_and_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url_and_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url.as_ref())?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(VauditError::Network)?;

        Ok(Self {
            http,
            base_url,
            options: ImageExportOptions::default(),
        })
    }

    pub fn with_options(mut self, options: ImageExportOptions) -> Result<Self> {
        validate_scale(options.scale)?;
        self.options = options;
        Ok(self)
    }

    pub fn options(&self) -> ImageExportOptions {
        self.options
    }

    /// Asks Figma to render one node and returns the temporary image URL.
    pub async fn export_image(
        &self,
        auth: &FigmaAuth,
        file_key: &str,
        node_id: &str,
    ) -> Result<String> {
        if node_id.is_empty() {
            return Err(VauditError::validation(
                "node id cannot be empty when exporting Figma images",
            ));
        }

        let mut url = self.endpoint(&format!("/v1/images/{file_key}"))?;
        url.query_pairs_mut()
            .append_pair("ids", node_id)
            .append_pair("format", EXPORT_FORMAT)
            .append_pair("scale", &self.options.scale.to_string());

        debug!(file_key, node_id, "requesting figma export");
        let resp: FigmaImageResponse = self.send_json(auth.apply(self.http.get(url))).await?;

        if let Some(err) = resp.err.filter(|e| !e.is_empty()) {
            return Err(VauditError::figma_api(None, err));
        }

        resp.images
            .get(node_id)
            .cloned()
            .flatten()
            .ok_or_else(|| {
                VauditError::figma_api(None, format!("node {node_id} could not be exported"))
            })
    }

    /// Fetches the rendered image. Export URLs are pre-signed, so no
    /// credential is sent.
    pub async fn download_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await.map_err(VauditError::Network)?;

        let status = response.status();

        if status.is_success() {
            return response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(VauditError::Network);
        }

        let body = response.text().await.unwrap_or_default();
        Err(VauditError::figma_api(
            Some(status),
            format!(
                "failed to download image (status {}): {}",
                status.as_u16(),
                body
            ),
        ))
    }

    /// Export followed by download, producing the design-side artifact.
    pub async fn export_node(
        &self,
        auth: &FigmaAuth,
        reference: &DesignReference,
    ) -> Result<CaptureArtifact> {
        let node_id = reference.node_id.as_deref().ok_or_else(|| {
            VauditError::validation("design reference has no node id; nothing to export")
        })?;

        let image_url = self.export_image(auth, &reference.file_key, node_id).await?;
        let bytes = self.download_image(&image_url).await?;
        CaptureArtifact::from_image_bytes(SourceKind::Design, &bytes)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(VauditError::InvalidUrl)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(VauditError::Network)?;
        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str(&body).map_err(VauditError::Serialization);
        }

        Err(VauditError::figma_api(
            Some(status),
            error_message(status, &body, retry_after.as_deref()),
        ))
    }
}

#[async_trait]
impl DesignSource for FigmaClient {
    async fn export(
        &self,
        reference: &DesignReference,
        auth: &FigmaAuth,
    ) -> Result<CaptureArtifact> {
        self.export_node(auth, reference).await
    }
}

fn validate_scale(scale: f32) -> Result<()> {
    if !(scale > 0.0 && scale <= 4.0) {
        return Err(VauditError::Config(
            "scale must be within (0, 4] for Figma exports".into(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct FigmaImageResponse {
    /// Null entries mean Figma could not render that node.
    #[serde(default)]
    pub images: HashMap<String, Option<String>>,
    #[serde(default)]
    pub err: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageExportOptions {
    pub scale: f32,
}

impl Default for ImageExportOptions {
    fn default() -> Self {
        Self { scale: 2.0 }
    }
}

fn error_message(status: StatusCode, body: &str, retry_after: Option<&str>) -> String {
    let fallback = format!("Figma API returned status {}", status.as_u16());
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_body = parsed
        .as_ref()
        .and_then(|value| value.get("err").or_else(|| value.get("error")))
        .and_then(Value::as_str)
        .map(str::to_owned);

    match (status, retry_after, from_body) {
        (StatusCode::TOO_MANY_REQUESTS, Some(retry), Some(msg)) => {
            format!("{msg} (rate limited, retry after {retry}s)")
        }
        (StatusCode::TOO_MANY_REQUESTS, Some(retry), None) => {
            format!("rate limited by Figma API, retry after {retry}s")
        }
        (_, _, Some(msg)) => msg,
        _ => fallback,
    }
}
