//! Canonical audit report consumed by the dashboard.
//!
//! Reports are only produced by [`crate::analysis::normalize_report`]. There
//! is no `Deserialize` impl, so an upstream `totalIssues` never reaches a
//! report.

use serde::Serialize;

/// Sentinel for string fields the analysis service left out.
pub const UNAVAILABLE: &str = "unavailable";

/// Issue category. Labels outside the known set are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum IssueCategory {
    Layout,
    Typography,
    Color,
    Spacing,
    Content,
    Unrecognized(String),
}

impl From<String> for IssueCategory {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "layout" | "布局" => Self::Layout,
            "typography" | "font" | "字体" => Self::Typography,
            "color" | "colour" | "颜色" => Self::Color,
            "spacing" | "间距" => Self::Spacing,
            "content" | "内容" => Self::Content,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<IssueCategory> for String {
    fn from(value: IssueCategory) -> Self {
        match value {
            IssueCategory::Layout => "Layout".into(),
            IssueCategory::Typography => "Typography".into(),
            IssueCategory::Color => "Color".into(),
            IssueCategory::Spacing => "Spacing".into(),
            IssueCategory::Content => "Content".into(),
            IssueCategory::Unrecognized(raw) => raw,
        }
    }
}

/// Issue severity, most to least severe. Labels outside the known set are
/// kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Severity {
    Blocker,
    Major,
    Minor,
    Polish,
    Unrecognized(String),
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "blocker" | "critical" | "致命" => Self::Blocker,
            "major" | "严重" => Self::Major,
            "minor" | "次要" => Self::Minor,
            "polish" | "优化" => Self::Polish,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<Severity> for String {
    fn from(value: Severity) -> Self {
        match value {
            Severity::Blocker => "Blocker".into(),
            Severity::Major => "Major".into(),
            Severity::Minor => "Minor".into(),
            Severity::Polish => "Polish".into(),
            Severity::Unrecognized(raw) => raw,
        }
    }
}

/// Position of an issue on the implementation image, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IssueLocation {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub description: String,
    pub suggestion: String,
    /// 1-10 when the service provided one, 0 when it did not.
    pub impact_score: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<IssueLocation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetrics {
    pub layout_accuracy: u8,
    pub visual_fidelity: u8,
    pub content_consistency: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    completion_score: u8,
    performance_score: u8,
    rating: String,
    summary: String,
    metrics: ReportMetrics,
    performance_suggestions: Vec<String>,
    issues: Vec<AuditIssue>,
    total_issues: usize,
}

impl AuditReport {
    pub(crate) fn new(
        completion_score: u8,
        performance_score: u8,
        rating: String,
        summary: String,
        metrics: ReportMetrics,
        performance_suggestions: Vec<String>,
        issues: Vec<AuditIssue>,
    ) -> Self {
        let total_issues = issues.len();
        Self {
            completion_score,
            performance_score,
            rating,
            summary,
            metrics,
            performance_suggestions,
            issues,
            total_issues,
        }
    }

    pub fn completion_score(&self) -> u8 {
        self.completion_score
    }

    pub fn performance_score(&self) -> u8 {
        self.performance_score
    }

    pub fn rating(&self) -> &str {
        &self.rating
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn metrics(&self) -> ReportMetrics {
        self.metrics
    }

    pub fn performance_suggestions(&self) -> &[String] {
        &self.performance_suggestions
    }

    pub fn issues(&self) -> &[AuditIssue] {
        &self.issues
    }

    pub fn total_issues(&self) -> usize {
        self.total_issues
    }
}
