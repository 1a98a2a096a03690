mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};
use vaudit_lib::{build_router, AppState, SourceKind};

use common::{artifact, spawn_router, StubAnalysis, Stubs};

async fn start(state: AppState) -> String {
    let addr = spawn_router(build_router(state)).await;
    format!("http://{addr}")
}

async fn post(base: &str, path: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .json(&body)
        .send()
        .await
        .expect("send request");
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.expect("json body");
    (status, body)
}

#[tokio::test]
async fn healthz_reports_analysis_availability() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let body: Value = reqwest::get(format!("{base}/healthz"))
        .await
        .expect("healthz")
        .json()
        .await
        .expect("json");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["analysis"], false);
}

#[tokio::test]
async fn audit_setup_with_only_preview_returns_implementation_and_performance() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/audit-setup",
        json!({"previewUrl": "https://example.com"}),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body["designImg"].is_null());
    assert!(body["implImg"]
        .as_str()
        .expect("implImg")
        .starts_with("data:image/png;base64,"));
    assert_eq!(body["perfData"]["score"], 87);
    assert_eq!(body["perfData"]["metrics"]["lcp"], "1.8 s");
    assert_eq!(body["errors"], json!([]));
    assert_eq!(stubs.design.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn audit_setup_keeps_successful_sources_when_export_fails() {
    let stubs = Stubs::new(true, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/audit-setup",
        json!({
            "figmaUrl": "https://www.figma.com/design/KEY/Page?node-id=1-2",
            "figmaToken": "tok",
            "previewUrl": "https://example.com"
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body["designImg"].is_null());
    assert!(body["implImg"].is_string());
    assert!(body["perfData"].is_object());
    let errors = body["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["source"], "design");
    assert!(errors[0]["message"].as_str().unwrap().contains("1:2"));
}

#[tokio::test]
async fn audit_setup_survives_a_failed_performance_audit() {
    let stubs = Stubs::new(false, false, true);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/audit-setup",
        json!({"previewUrl": "https://example.com"}),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body["implImg"]
        .as_str()
        .expect("implImg")
        .starts_with("data:image/png;base64,"));
    assert!(body["perfData"].is_null());
    let errors = body["errors"].as_array().expect("errors");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["source"], "performance");
    assert!(errors[0]["message"].as_str().unwrap().contains("NO_FCP"));
    assert_eq!(stubs.probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn audit_setup_fails_when_nothing_was_acquired() {
    let stubs = Stubs::new(false, true, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/audit-setup",
        json!({"previewUrl": "https://example.com"}),
    )
    .await;

    assert_eq!(status, 500);
    let error = body["error"].as_str().expect("error");
    assert!(error.contains("timed out"), "{error}");
    assert_eq!(stubs.probe.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn audit_setup_rejects_empty_requests_without_external_calls() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(&base, "/api/audit-setup", json!({"previewUrl": "  "})).await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("nothing to acquire"));
    assert_eq!(stubs.capture.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn figma_endpoint_requires_node_id() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/figma",
        json!({"figmaUrl": "https://www.figma.com/design/KEY/Page", "figmaToken": "tok"}),
    )
    .await;

    assert_eq!(status, 500);
    assert!(body["error"].as_str().unwrap().contains("node-id"));
    assert_eq!(stubs.design.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn figma_endpoint_returns_image() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/figma",
        json!({"figmaUrl": "https://www.figma.com/design/KEY/Page?node-id=1-2", "figmaToken": "tok"}),
    )
    .await;

    assert_eq!(status, 200);
    assert!(body["image"].as_str().unwrap().starts_with("data:image/png"));
}

#[tokio::test]
async fn screenshot_and_performance_endpoints_reject_bad_urls() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, _) = post(&base, "/api/preview-screenshot", json!({"url": "ftp://x"})).await;
    assert_eq!(status, 500);

    let (status, body) = post(
        &base,
        "/api/preview-performance",
        json!({"url": "https://example.com"}),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["score"], 87);
    assert_eq!(body["metrics"]["fcp"], "0.9 s");
}

#[tokio::test]
async fn audit_without_backend_is_unavailable() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let (status, body) = post(
        &base,
        "/api/audit",
        json!({
            "designImg": artifact(SourceKind::Design).into_data_uri(),
            "implImg": artifact(SourceKind::Implementation).into_data_uri()
        }),
    )
    .await;

    assert_eq!(status, 503);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn audit_returns_normalized_report() {
    let stubs = Stubs::new(false, false, false);
    let backend = StubAnalysis {
        raw: r#"{"completionScore": 77, "totalIssues": 9, "issues": [{"severity": "Unheard-of", "category": "布局"}]}"#
            .to_string(),
    };
    let state = AppState::new(stubs.orchestrator()).with_analysis(Arc::new(backend));
    let base = start(state).await;

    let (status, body) = post(
        &base,
        "/api/audit",
        json!({
            "designImg": artifact(SourceKind::Design).into_data_uri(),
            "implImg": artifact(SourceKind::Implementation).into_data_uri(),
            "perfData": {"score": 50, "metrics": {"fcp": "1 s", "lcp": "2 s", "cls": "0", "tbt": "0 ms"}}
        }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["completionScore"], 77);
    assert_eq!(body["totalIssues"], 1);
    assert_eq!(body["issues"][0]["severity"], "Unheard-of");
    assert_eq!(body["issues"][0]["category"], "Layout");
    assert_eq!(body["rating"], "unavailable");
}

#[tokio::test]
async fn audit_reports_unparseable_analysis() {
    let stubs = Stubs::new(false, false, false);
    let backend = StubAnalysis {
        raw: "I cannot compare these images.".to_string(),
    };
    let state = AppState::new(stubs.orchestrator()).with_analysis(Arc::new(backend));
    let base = start(state).await;

    let (status, body) = post(
        &base,
        "/api/audit",
        json!({
            "designImg": artifact(SourceKind::Design).into_data_uri(),
            "implImg": artifact(SourceKind::Implementation).into_data_uri()
        }),
    )
    .await;

    assert_eq!(status, 500);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("Failed to parse analysis response"));
}

#[tokio::test]
async fn cors_preflight_allows_any_origin_by_default() {
    let stubs = Stubs::new(false, false, false);
    let base = start(AppState::new(stubs.orchestrator())).await;

    let resp = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{base}/api/audit-setup"))
        .header("origin", "http://localhost:5173")
        .send()
        .await
        .expect("preflight");

    assert_eq!(resp.status().as_u16(), 204);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn cors_restricts_to_configured_origins() {
    let stubs = Stubs::new(false, false, false);
    let state = AppState::new(stubs.orchestrator())
        .with_cors_origins(vec!["http://dashboard.test".to_string()]);
    let base = start(state).await;

    let resp = reqwest::Client::new()
        .get(format!("{base}/healthz"))
        .header("origin", "http://elsewhere.test")
        .send()
        .await
        .expect("healthz");
    assert!(resp.headers().get("access-control-allow-origin").is_none());

    let resp = reqwest::Client::new()
        .get(format!("{base}/healthz"))
        .header("origin", "http://dashboard.test")
        .send()
        .await
        .expect("healthz");
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("http://dashboard.test")
    );
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let stubs = Stubs::new(false, false, false);
    let state = AppState::new(stubs.orchestrator()).with_body_limit(1024);
    let base = start(state).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/api/preview-screenshot"))
        .json(&json!({"url": "x".repeat(4096)}))
        .send()
        .await
        .expect("send");

    assert_eq!(resp.status().as_u16(), 413);
    assert_eq!(stubs.capture.calls.load(Ordering::SeqCst), 0);
}
