#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use url::Url;
use vaudit_lib::{
    AcquisitionOrchestrator, AnalysisBackend, AuditRequest, CaptureArtifact, DesignReference,
    DesignSource, FigmaAuth, PageCapture, PerformanceMetrics, PerformanceProbe,
    PerformanceTimings, Result, SourceKind, VauditError,
};

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        image::Rgba([10, 20, 30, 255]),
    ));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png)
        .expect("encode png");
    buf.into_inner()
}

pub fn artifact(kind: SourceKind) -> CaptureArtifact {
    CaptureArtifact::from_image_bytes(kind, &png_bytes(4, 3)).expect("artifact")
}

pub fn sample_metrics() -> PerformanceMetrics {
    PerformanceMetrics {
        score: 87,
        metrics: PerformanceTimings {
            first_contentful_paint: "0.9 s".into(),
            largest_contentful_paint: "1.8 s".into(),
            cumulative_layout_shift: "0.02".into(),
            total_blocking_time: "40 ms".into(),
        },
    }
}

#[derive(Default)]
pub struct StubDesign {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl DesignSource for StubDesign {
    async fn export(&self, reference: &DesignReference, _auth: &FigmaAuth) -> Result<CaptureArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VauditError::figma_api(
                None,
                format!(
                    "node {} could not be exported",
                    reference.node_id.as_deref().unwrap_or("?")
                ),
            ));
        }
        Ok(artifact(SourceKind::Design))
    }
}

#[derive(Default)]
pub struct StubCapture {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PageCapture for StubCapture {
    async fn capture(&self, _url: &Url) -> Result<CaptureArtifact> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VauditError::Capture(
                "Playwright helper timed out after 90s and was stopped".into(),
            ));
        }
        Ok(artifact(SourceKind::Implementation))
    }
}

#[derive(Default)]
pub struct StubProbe {
    pub fail: bool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl PerformanceProbe for StubProbe {
    async fn audit(&self, _url: &Url) -> Result<PerformanceMetrics> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(VauditError::Performance("Lighthouse runtime error: NO_FCP".into()));
        }
        Ok(sample_metrics())
    }
}

/// Returns a canned analysis document.
pub struct StubAnalysis {
    pub raw: String,
}

#[async_trait]
impl AnalysisBackend for StubAnalysis {
    async fn complete(&self, _request: &AuditRequest) -> Result<String> {
        Ok(self.raw.clone())
    }
}

pub struct Stubs {
    pub design: Arc<StubDesign>,
    pub capture: Arc<StubCapture>,
    pub probe: Arc<StubProbe>,
}

impl Stubs {
    pub fn new(design_fails: bool, capture_fails: bool, probe_fails: bool) -> Self {
        Self {
            design: Arc::new(StubDesign {
                fail: design_fails,
                ..Default::default()
            }),
            capture: Arc::new(StubCapture {
                fail: capture_fails,
                ..Default::default()
            }),
            probe: Arc::new(StubProbe {
                fail: probe_fails,
                ..Default::default()
            }),
        }
    }

    pub fn orchestrator(&self) -> AcquisitionOrchestrator {
        AcquisitionOrchestrator::new(
            self.design.clone(),
            self.capture.clone(),
            self.probe.clone(),
        )
    }
}

pub async fn spawn_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("serve app") });
    addr
}
