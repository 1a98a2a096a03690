//! Report normalizer.
//!
//! The analysis service is asked for a schema-constrained document, but the
//! result is still treated as untrusted: every field is checked here
//! independently of the schema that was requested.

use serde_json::{Map, Value};

use crate::types::{
    AuditIssue, AuditReport, IssueCategory, IssueLocation, ReportMetrics, Severity, UNAVAILABLE,
};
use crate::{Result, VauditError};

/// Parses the raw analysis text into a canonical [`AuditReport`].
///
/// Missing numbers become 0, missing strings become `"unavailable"` and
/// missing lists become empty. Out-of-range numbers are clamped.
/// `totalIssues` is always recomputed from the issue list.
pub fn normalize_report(raw: &str) -> Result<AuditReport> {
    let body = extract_json_object(raw)
        .ok_or_else(|| VauditError::analysis_parse("response contains no JSON object"))?;

    let value: Value = serde_json::from_str(body)
        .map_err(|e| VauditError::analysis_parse(format!("malformed JSON: {e}")))?;
    let doc = value
        .as_object()
        .ok_or_else(|| VauditError::analysis_parse("top-level JSON value is not an object"))?;

    let metrics = doc
        .get("metrics")
        .and_then(Value::as_object)
        .map(|m| ReportMetrics {
            layout_accuracy: percent(m.get("layoutAccuracy")),
            visual_fidelity: percent(m.get("visualFidelity")),
            content_consistency: percent(m.get("contentConsistency")),
        })
        .unwrap_or_default();

    let suggestions = doc
        .get("performanceSuggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let issues = doc
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_object).map(issue).collect())
        .unwrap_or_default();

    Ok(AuditReport::new(
        percent(doc.get("completionScore")),
        percent(doc.get("performanceScore")),
        text(doc.get("rating")),
        text(doc.get("summary")),
        metrics,
        suggestions,
        issues,
    ))
}

fn issue(item: &Map<String, Value>) -> AuditIssue {
    AuditIssue {
        category: IssueCategory::from(text(item.get("category"))),
        severity: Severity::from(text(item.get("severity"))),
        description: text(item.get("description")),
        suggestion: text(item.get("suggestion")),
        impact_score: number(item.get("impactScore"))
            .map(|n| n.round().clamp(1.0, 10.0) as u8)
            .unwrap_or(0),
        location: item.get("location").and_then(Value::as_object).and_then(|loc| {
            let x = number(loc.get("x"))?;
            let y = number(loc.get("y"))?;
            Some(IssueLocation {
                x: x.clamp(0.0, 100.0),
                y: y.clamp(0.0, 100.0),
            })
        }),
    }
}

/// Strips Markdown fences and surrounding prose, returning the outermost
/// `{ ... }` span.
fn extract_json_object(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    (start < end).then(|| &unfenced[start..=end])
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(value: Option<&Value>) -> Option<f64> {
    let parsed: Option<f64> = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn percent(value: Option<&Value>) -> u8 {
    number(value)
        .map(|n| n.round().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

fn text(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNAVAILABLE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_without_issues_has_zero_total() {
        let report = normalize_report(r#"{"completionScore": 88, "rating": "A", "summary": "close"}"#)
            .unwrap();
        assert!(report.issues().is_empty());
        assert_eq!(report.total_issues(), 0);
        assert_eq!(report.completion_score(), 88);
        assert_eq!(report.metrics(), ReportMetrics::default());
    }

    #[test]
    fn unknown_severity_is_preserved_verbatim() {
        let report = normalize_report(
            r#"{"issues": [{"category": "Layout", "severity": "Catastrophic", "description": "d", "suggestion": "s", "impactScore": 4}]}"#,
        )
        .unwrap();
        let issue = &report.issues()[0];
        assert_eq!(issue.severity, Severity::Unrecognized("Catastrophic".into()));
        assert_eq!(issue.category, IssueCategory::Layout);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["issues"][0]["severity"], "Catastrophic");
    }

    #[test]
    fn upstream_total_issues_is_ignored() {
        let report = normalize_report(
            r#"{"totalIssues": 42, "issues": [{"description": "one"}, {"description": "two"}]}"#,
        )
        .unwrap();
        assert_eq!(report.total_issues(), 2);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let report = normalize_report(r#"{"issues": [{}]}"#).unwrap();
        assert_eq!(report.rating(), UNAVAILABLE);
        assert_eq!(report.summary(), UNAVAILABLE);
        assert_eq!(report.performance_score(), 0);
        assert!(report.performance_suggestions().is_empty());

        let issue = &report.issues()[0];
        assert_eq!(issue.description, UNAVAILABLE);
        assert_eq!(issue.impact_score, 0);
        assert!(issue.location.is_none());
    }

    #[test]
    fn numbers_are_clamped_into_range() {
        let report = normalize_report(
            r#"{
                "completionScore": 140,
                "performanceScore": -5,
                "metrics": {"layoutAccuracy": "91.6", "visualFidelity": 101, "contentConsistency": null},
                "issues": [
                    {"impactScore": 0.2, "location": {"x": 130, "y": -4}},
                    {"impactScore": 55}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(report.completion_score(), 100);
        assert_eq!(report.performance_score(), 0);
        assert_eq!(report.metrics().layout_accuracy, 92);
        assert_eq!(report.metrics().visual_fidelity, 100);
        assert_eq!(report.metrics().content_consistency, 0);
        assert_eq!(report.issues()[0].impact_score, 1);
        assert_eq!(
            report.issues()[0].location,
            Some(IssueLocation { x: 100.0, y: 0.0 })
        );
        assert_eq!(report.issues()[1].impact_score, 10);
    }

    #[test]
    fn code_fences_and_prose_are_tolerated() {
        let raw = "```json\n{\"completionScore\": 70, \"rating\": \"B\"}\n```";
        assert_eq!(normalize_report(raw).unwrap().completion_score(), 70);

        let raw = "Here is the audit:\n{\"completionScore\": 65}\nThanks!";
        assert_eq!(normalize_report(raw).unwrap().completion_score(), 65);
    }

    #[test]
    fn localized_labels_become_canonical() {
        let report = normalize_report(
            r#"{"issues": [{"category": "字体", "severity": "严重", "impactScore": 7}]}"#,
        )
        .unwrap();
        let issue = &report.issues()[0];
        assert_eq!(issue.category, IssueCategory::Typography);
        assert_eq!(issue.severity, Severity::Major);
    }

    #[test]
    fn malformed_documents_fail() {
        for raw in ["", "no json here", "{\"completionScore\": 80", "[1, 2, 3]", "{ not json }"] {
            let err = normalize_report(raw).unwrap_err();
            assert!(
                matches!(err, VauditError::AnalysisParse(_)),
                "expected parse error for {raw:?}, got {err:?}"
            );
        }
    }

    #[test]
    fn non_object_issue_entries_are_dropped() {
        let report =
            normalize_report(r#"{"issues": ["oops", 3, {"description": "real"}]}"#).unwrap();
        assert_eq!(report.total_issues(), 1);
        assert_eq!(report.issues()[0].description, "real");
    }
}
