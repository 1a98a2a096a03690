//! Audit request builder.
//!
//! Combines the two artifacts and the optional performance measurement into
//! the input of the analysis service. The performance context is always
//! present: either the measured figures or an explicit instruction to
//! estimate.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::types::{CaptureArtifact, PerformanceMetrics, SourceKind};
use crate::{Result, VauditError};

/// Language of the analysis instructions and of the report prose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionLanguage {
    #[default]
    #[serde(alias = "en")]
    English,
    #[serde(alias = "zh", alias = "zh-cn")]
    Chinese,
}

impl std::str::FromStr for InstructionLanguage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "chinese" | "zh" | "zh-cn" => Ok(Self::Chinese),
            other => Err(format!("unsupported instruction language '{other}'")),
        }
    }
}

/// Everything the analysis service receives for one audit.
#[derive(Debug)]
pub struct AuditRequest {
    design: CaptureArtifact,
    implementation: CaptureArtifact,
    performance: Option<PerformanceMetrics>,
    language: InstructionLanguage,
}

impl AuditRequest {
    /// Artifacts must be a design export and an implementation capture, in
    /// that order.
    pub fn new(
        design: CaptureArtifact,
        implementation: CaptureArtifact,
        performance: Option<PerformanceMetrics>,
    ) -> Result<Self> {
        if design.source_kind() != SourceKind::Design {
            return Err(VauditError::validation(
                "first artifact of an audit must be the design export",
            ));
        }
        if implementation.source_kind() != SourceKind::Implementation {
            return Err(VauditError::validation(
                "second artifact of an audit must be the implementation capture",
            ));
        }

        Ok(Self {
            design,
            implementation,
            performance,
            language: InstructionLanguage::default(),
        })
    }

    pub fn with_language(mut self, language: InstructionLanguage) -> Self {
        self.language = language;
        self
    }

    pub fn design(&self) -> &CaptureArtifact {
        &self.design
    }

    pub fn implementation(&self) -> &CaptureArtifact {
        &self.implementation
    }

    pub fn performance(&self) -> Option<&PerformanceMetrics> {
        self.performance.as_ref()
    }

    pub fn language(&self) -> InstructionLanguage {
        self.language
    }

    pub fn has_measured_performance(&self) -> bool {
        self.performance.is_some()
    }

    /// One sentence describing the performance data, or the instruction to
    /// estimate when nothing was measured.
    pub fn performance_context(&self) -> String {
        match (&self.performance, self.language) {
            (Some(p), InstructionLanguage::English) => format!(
                "Measured performance data (Lighthouse): score {}, FCP {}, LCP {}, CLS {}, TBT {}.",
                p.score,
                p.metrics.first_contentful_paint,
                p.metrics.largest_contentful_paint,
                p.metrics.cumulative_layout_shift,
                p.metrics.total_blocking_time
            ),
            (None, InstructionLanguage::English) => "No measured performance data is available; \
                estimate performance from the visual structure of the implementation screenshot."
                .to_string(),
            (Some(p), InstructionLanguage::Chinese) => format!(
                "【真实性能监测数据】：Lighthouse 得分 {}, FCP: {}, LCP: {}, CLS: {}, TBT: {}。",
                p.score,
                p.metrics.first_contentful_paint,
                p.metrics.largest_contentful_paint,
                p.metrics.cumulative_layout_shift,
                p.metrics.total_blocking_time
            ),
            (None, InstructionLanguage::Chinese) => {
                "尚未获取到真实性能指标，请根据视觉结构进行预估。".to_string()
            }
        }
    }

    /// Full instruction text sent alongside the two images.
    pub fn instructions(&self) -> String {
        let context = self.performance_context();
        match self.language {
            InstructionLanguage::English => {
                let score_hint = match &self.performance {
                    Some(p) => format!("use the measured Lighthouse score {} as the reference", p.score),
                    None => "estimate a score from 0 to 100".to_string(),
                };
                format!(
                    "You are an expert in UI implementation fidelity and web performance.\n\
                     Compare the design mock-up (image 1) with the screenshot of the implemented page (image 2).\n\
                     \n\
                     {context}\n\
                     \n\
                     Tasks:\n\
                     1. Visual comparison: find layout shifts, typography deviations, colour mismatches, spacing and content differences.\n\
                     2. Performance review: combine the performance data above with the page complexity visible in image 2 and give concrete technical advice.\n\
                     \n\
                     Output requirements:\n\
                     - Write all prose in English.\n\
                     - completionScore: visual fidelity from 0 to 100.\n\
                     - performanceScore: {score_hint}.\n\
                     - performanceSuggestions: at least 3 concrete technical suggestions.\n\
                     - category is one of Layout, Typography, Color, Spacing, Content.\n\
                     - severity is one of Blocker, Major, Minor, Polish.\n\
                     - impactScore from 1 to 10; location x/y are percentages of image 2.\n\
                     - Return only the JSON document described by the schema."
                )
            }
            InstructionLanguage::Chinese => {
                let score_hint = match &self.performance {
                    Some(p) => format!("请参考真实得分 {} 进行评分", p.score),
                    None => "请根据视觉结构预估 0-100 分".to_string(),
                };
                format!(
                    "你是一位世界级的 UI 还原度专家和性能调优专家。\n\
                     对比“设计稿”（图1）与“前端实现截图”（图2）。\n\
                     \n\
                     {context}\n\
                     \n\
                     任务：\n\
                     1. 视觉对比：检测布局偏移、字体偏差、颜色值不一致、间距与内容差异。\n\
                     2. 性能解读：结合提供的性能数据和图2的页面复杂度，给出深度技术建议。\n\
                     \n\
                     输出要求：\n\
                     - 使用中文。\n\
                     - completionScore: 视觉还原评分（0-100）。\n\
                     - performanceScore: {score_hint}。\n\
                     - performanceSuggestions: 至少3条深度技术建议。\n\
                     - category 取值：布局、字体、颜色、间距、内容。\n\
                     - severity 取值：致命、严重、次要、优化。\n\
                     - impactScore 取值 1-10，location 的 x/y 为图2中的百分比位置。\n\
                     - 仅按 Schema 返回 JSON。"
                )
            }
        }
    }

    /// JSON schema of the expected report. Performance fields are only
    /// required when real measurements were supplied.
    pub fn response_schema(&self) -> Value {
        let mut required = vec!["completionScore", "rating", "summary", "metrics", "issues"];
        if self.has_measured_performance() {
            required.extend(["performanceScore", "performanceSuggestions"]);
        }

        json!({
            "type": "object",
            "properties": {
                "completionScore": { "type": "number" },
                "performanceScore": { "type": "number" },
                "performanceSuggestions": { "type": "array", "items": { "type": "string" } },
                "rating": { "type": "string" },
                "summary": { "type": "string" },
                "metrics": {
                    "type": "object",
                    "properties": {
                        "layoutAccuracy": { "type": "number" },
                        "visualFidelity": { "type": "number" },
                        "contentConsistency": { "type": "number" }
                    },
                    "required": ["layoutAccuracy", "visualFidelity", "contentConsistency"]
                },
                "issues": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "category": { "type": "string" },
                            "severity": { "type": "string" },
                            "description": { "type": "string" },
                            "suggestion": { "type": "string" },
                            "impactScore": { "type": "number" },
                            "location": {
                                "type": "object",
                                "properties": {
                                    "x": { "type": "number" },
                                    "y": { "type": "number" }
                                }
                            }
                        }
                    }
                }
            },
            "required": required
        })
    }
}
