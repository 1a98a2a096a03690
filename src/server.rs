//! HTTP surface consumed by the dashboard.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::acquisition::{AcquisitionOrchestrator, AcquisitionRequest};
use crate::analysis::{
    perform_audit, AnalysisBackend, AuditRequest, InstructionLanguage, VisionClient,
};
use crate::config::{Config, DEFAULT_BODY_LIMIT};
use crate::figma_client::FigmaAuth;
use crate::types::{AcquisitionResult, CaptureArtifact, PerformanceMetrics, SourceError, SourceKind};
use crate::{Result, VauditError};

#[derive(Clone)]
pub struct AppState {
    orchestrator: AcquisitionOrchestrator,
    analysis: Option<Arc<dyn AnalysisBackend>>,
    language: InstructionLanguage,
    measure_performance: bool,
    cors_origins: Arc<Vec<String>>,
    body_limit_bytes: usize,
}

impl AppState {
    pub fn new(orchestrator: AcquisitionOrchestrator) -> Self {
        Self {
            orchestrator,
            analysis: None,
            language: InstructionLanguage::default(),
            measure_performance: true,
            cors_origins: Arc::new(Vec::new()),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
        }
    }

    /// Wires the Figma client, the Playwright capturer, the Lighthouse
    /// auditor and (when a key is configured) the vision client.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut state = Self::new(AcquisitionOrchestrator::from_config(config)?)
            .with_language(config.analysis.language)
            .with_performance(config.performance.enabled)
            .with_cors_origins(config.server.cors_origins.clone())
            .with_body_limit(config.server.body_limit_bytes);
        if let Some(client) = VisionClient::from_config(&config.analysis)? {
            state = state.with_analysis(Arc::new(client));
        }
        Ok(state)
    }

    pub fn with_analysis(mut self, backend: Arc<dyn AnalysisBackend>) -> Self {
        self.analysis = Some(backend);
        self
    }

    pub fn with_language(mut self, language: InstructionLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn with_performance(mut self, enabled: bool) -> Self {
        self.measure_performance = enabled;
        self
    }

    /// Empty means any origin.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Arc::new(origins);
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    pub fn has_analysis(&self) -> bool {
        self.analysis.is_some()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("analysis", &self.analysis.is_some())
            .field("language", &self.language)
            .field("measure_performance", &self.measure_performance)
            .field("cors_origins", &self.cors_origins)
            .field("body_limit_bytes", &self.body_limit_bytes)
            .finish_non_exhaustive()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/figma", post(figma_handler))
        .route("/api/preview-screenshot", post(screenshot_handler))
        .route("/api/preview-performance", post(performance_handler))
        .route("/api/audit-setup", post(audit_setup_handler))
        .route("/api/audit", post(audit_handler))
        .layer(from_fn_with_state(state.clone(), cors_middleware))
        .layer(from_fn(request_log_middleware))
        .layer(DefaultBodyLimit::max(state.body_limit_bytes))
        .with_state(state)
}

/// Serves until Ctrl-C, then drains in-flight requests.
pub async fn serve(state: AppState, bind: SocketAddr) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(
        addr = %listener.local_addr()?,
        analysis = state.has_analysis(),
        "vaudit listening"
    );
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("vaudit stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// `{error}` response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<VauditError> for ApiError {
    fn from(err: VauditError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(status = self.status.as_u16(), error = %self.message, "request failed");
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FigmaBody {
    #[serde(default)]
    pub figma_url: String,
    pub figma_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlBody {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSetupBody {
    pub figma_url: Option<String>,
    pub preview_url: Option<String>,
    pub figma_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditBody {
    pub design_img: String,
    pub impl_img: String,
    pub perf_data: Option<PerformanceMetrics>,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub image: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSetupResponse {
    pub design_img: Option<String>,
    pub impl_img: Option<String>,
    pub perf_data: Option<PerformanceMetrics>,
    pub errors: Vec<SourceError>,
}

impl From<AcquisitionResult> for AuditSetupResponse {
    fn from(result: AcquisitionResult) -> Self {
        Self {
            design_img: result.design_artifact.map(CaptureArtifact::into_data_uri),
            impl_img: result.implementation_artifact.map(CaptureArtifact::into_data_uri),
            perf_data: result.performance,
            errors: result.errors,
        }
    }
}

async fn healthz_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "analysis": state.has_analysis(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn figma_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<FigmaBody>, JsonRejection>,
) -> ApiResult<ImageResponse> {
    let Json(body) = body?;
    let auth = FigmaAuth::from_token(body.figma_token.as_deref());
    let artifact = state.orchestrator.export_design(&body.figma_url, auth).await?;
    Ok(Json(ImageResponse {
        image: artifact.into_data_uri(),
    }))
}

async fn screenshot_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<UrlBody>, JsonRejection>,
) -> ApiResult<ImageResponse> {
    let Json(body) = body?;
    let artifact = state.orchestrator.capture_page(&body.url).await?;
    Ok(Json(ImageResponse {
        image: artifact.into_data_uri(),
    }))
}

async fn performance_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<UrlBody>, JsonRejection>,
) -> ApiResult<PerformanceMetrics> {
    let Json(body) = body?;
    Ok(Json(state.orchestrator.measure_performance(&body.url).await?))
}

async fn audit_setup_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<AuditSetupBody>, JsonRejection>,
) -> ApiResult<AuditSetupResponse> {
    let Json(body) = body?;
    let request = AcquisitionRequest {
        figma_url: body.figma_url,
        figma_auth: FigmaAuth::from_token(body.figma_token.as_deref()),
        preview_url: body.preview_url,
        measure_performance: state.measure_performance,
    };

    let result = state.orchestrator.acquire(&request).await?;
    if result.has_no_artifacts() {
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            result.error_summary(),
        ));
    }
    Ok(Json(result.into()))
}

async fn audit_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<AuditBody>, JsonRejection>,
) -> Response {
    let Some(backend) = state.analysis.clone() else {
        return ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "analysis backend is not configured; set VAUDIT_VISION_API_KEY",
        )
        .into_response();
    };

    let run = async {
        let Json(body) = body?;
        let request = AuditRequest::new(
            CaptureArtifact::from_data_uri(SourceKind::Design, &body.design_img)?,
            CaptureArtifact::from_data_uri(SourceKind::Implementation, &body.impl_img)?,
            body.perf_data,
        )?
        .with_language(state.language);
        let report = perform_audit(backend.as_ref(), &request).await?;
        Ok::<_, ApiError>(Json(report))
    };

    match run.await {
        Ok(report) => report.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn cors_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let origin = req
        .headers()
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let allow = allowed_origin(&state.cors_origins, origin.as_deref());

    let mut resp = if req.method() == Method::OPTIONS {
        let mut resp = StatusCode::NO_CONTENT.into_response();
        if allow.is_some() {
            let headers = resp.headers_mut();
            headers.insert(
                "access-control-allow-methods",
                HeaderValue::from_static("GET,POST,OPTIONS"),
            );
            headers.insert(
                "access-control-allow-headers",
                HeaderValue::from_static("content-type"),
            );
        }
        resp
    } else {
        next.run(req).await
    };

    if let Some(value) = allow.and_then(|o| HeaderValue::from_str(&o).ok()) {
        resp.headers_mut().insert("access-control-allow-origin", value);
        if !state.cors_origins.is_empty() {
            resp.headers_mut()
                .insert("vary", HeaderValue::from_static("Origin"));
        }
    }
    resp
}

fn allowed_origin(allowed: &[String], origin: Option<&str>) -> Option<String> {
    if allowed.is_empty() {
        return Some("*".to_string());
    }
    let origin = origin?;
    allowed
        .iter()
        .any(|o| o == origin)
        .then(|| origin.to_string())
}

async fn request_log_middleware(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let resp = next.run(req).await;
    info!(
        method = %method,
        path = %path,
        status = resp.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request"
    );
    resp
}
