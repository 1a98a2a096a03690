use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vaudit_lib::output::{AcquireOutput, AuditOutput};
use vaudit_lib::{AcquisitionResult, CaptureArtifact, PerformanceMetrics, VauditError, VauditOutput};

use crate::cli::OutputFormat;

/// Write output in the requested format.
pub fn write_output(
    body: &VauditOutput,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_output(body, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_output(body, output.as_deref())?,
    };
    Ok(())
}

/// Render an error and return the appropriate exit code.
pub fn render_error(err: VauditError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let payload = VauditOutput::error(err.to_payload());

    match format {
        OutputFormat::Json => {
            let content =
                serde_json::to_string(&payload).unwrap_or_else(|_| "{\"mode\":\"error\"}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_output(&payload, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // 2 is fatal; partial acquisitions use 1.
    ExitCode::from(2)
}

fn write_json_output(body: &VauditOutput, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(body)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

fn write_pretty_output(body: &VauditOutput, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(body, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content =
        serde_json::to_string_pretty(body).unwrap_or_else(|_| "{\"mode\":\"error\"}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format output for human consumption in a terminal. Image data is
/// summarized, never printed.
pub fn format_pretty(body: &VauditOutput, colorize: bool) -> String {
    match body {
        VauditOutput::Acquire(out) => format_acquire(out, colorize),
        VauditOutput::Audit(out) => format_audit(out, colorize),
        VauditOutput::Error(out) => {
            let mut buf = String::new();
            let header = color("[ERROR]", "31", colorize);
            let message = out
                .message
                .as_deref()
                .unwrap_or_else(|| out.error.message.as_str());
            writeln!(buf, "{} {}", header, message).ok();
            if let Some(remediation) = &out.error.remediation {
                writeln!(buf, "Hint: {}", remediation).ok();
            }
            buf
        }
    }
}

fn format_acquire(out: &AcquireOutput, colorize: bool) -> String {
    let mut buf = String::new();
    let result = &out.result;
    let (status, code) = if result.errors.is_empty() {
        ("OK", "32")
    } else {
        ("PARTIAL", "33")
    };
    writeln!(
        buf,
        "{} {} Acquisition finished (viewport {})",
        color("[ACQUIRE]", "36", colorize),
        color(status, code, colorize),
        out.inputs.viewport
    )
    .ok();

    if out.inputs.figma_url.is_some() {
        writeln!(buf, "Design:         {}", artifact_line(result.design_artifact.as_ref())).ok();
    }
    if out.inputs.preview_url.is_some() {
        writeln!(
            buf,
            "Implementation: {}",
            artifact_line(result.implementation_artifact.as_ref())
        )
        .ok();
        if let Some(perf) = &result.performance {
            writeln!(buf, "Performance:    {}", performance_line(perf, colorize)).ok();
        }
    }

    if !result.errors.is_empty() {
        writeln!(buf, "Errors:").ok();
        for err in &result.errors {
            writeln!(buf, "- {}: {}", err.source, err.message).ok();
        }
    }
    buf
}

fn format_audit(out: &AuditOutput, colorize: bool) -> String {
    let mut buf = String::new();
    let report = &out.report;
    let completion = report.completion_score();
    writeln!(
        buf,
        "{} Completion {} (rating {})",
        color("[AUDIT]", "35", colorize),
        color(&format!("{completion}/100"), score_color_code(completion), colorize),
        report.rating()
    )
    .ok();
    writeln!(buf, "Summary: {}", report.summary()).ok();

    let metrics = report.metrics();
    writeln!(
        buf,
        "Metrics: layout {}, visual {}, content {}",
        metrics.layout_accuracy, metrics.visual_fidelity, metrics.content_consistency
    )
    .ok();

    let basis = if out.performance.is_some() {
        "measured"
    } else {
        "estimated"
    };
    writeln!(buf, "Performance: {}/100 ({basis})", report.performance_score()).ok();
    if let Some(perf) = &out.performance {
        writeln!(buf, "  {}", performance_line(perf, colorize)).ok();
    }
    if !report.performance_suggestions().is_empty() {
        writeln!(buf, "Suggestions:").ok();
        for suggestion in report.performance_suggestions() {
            writeln!(buf, "- {suggestion}").ok();
        }
    }

    writeln!(buf, "Issues ({}):", report.total_issues()).ok();
    for issue in report.issues() {
        let severity = String::from(issue.severity.clone());
        let category = String::from(issue.category.clone());
        writeln!(
            buf,
            "- [{}] {}: {} -> {}",
            severity, category, issue.description, issue.suggestion
        )
        .ok();
    }

    if !out.acquisition_errors.is_empty() {
        writeln!(buf, "Acquisition notes:").ok();
        for err in &out.acquisition_errors {
            writeln!(buf, "- {}: {}", err.source, err.message).ok();
        }
    }
    buf
}

fn artifact_line(artifact: Option<&CaptureArtifact>) -> String {
    match artifact {
        Some(a) => {
            let (w, h) = a.dimensions();
            format!("{w}x{h} {} ({} base64 bytes)", a.mime_type(), a.base64_payload().len())
        }
        None => "missing".to_string(),
    }
}

fn performance_line(perf: &PerformanceMetrics, colorize: bool) -> String {
    format!(
        "score {} | FCP {} | LCP {} | CLS {} | TBT {}",
        color(&perf.score.to_string(), score_color_code(perf.score), colorize),
        perf.metrics.first_contentful_paint,
        perf.metrics.largest_contentful_paint,
        perf.metrics.cumulative_layout_shift,
        perf.metrics.total_blocking_time
    )
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Map a 0-100 score to an ANSI color code.
fn score_color_code(score: u8) -> &'static str {
    if score >= 90 {
        "32" // green
    } else if score >= 50 {
        "33" // yellow
    } else {
        "31" // red
    }
}

/// 0 when every requested source succeeded, 1 when some failed.
pub fn exit_code_for_acquisition(result: &AcquisitionResult) -> ExitCode {
    if result.errors.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaudit_lib::error::{ErrorCategory, ErrorPayload};
    use vaudit_lib::{
        normalize_report, AcquisitionSource, Inputs, PerformanceTimings, SourceError, Viewport,
        VAUDIT_OUTPUT_VERSION,
    };

    fn inputs() -> Inputs {
        Inputs {
            figma_url: Some("https://www.figma.com/design/K/T?node-id=1-2".into()),
            preview_url: Some("https://example.com".into()),
            viewport: Viewport::default(),
        }
    }

    fn perf() -> PerformanceMetrics {
        PerformanceMetrics {
            score: 72,
            metrics: PerformanceTimings {
                first_contentful_paint: "1.4 s".into(),
                largest_contentful_paint: "3.2 s".into(),
                cumulative_layout_shift: "0.11".into(),
                total_blocking_time: "350 ms".into(),
            },
        }
    }

    #[test]
    fn exit_code_reflects_partial_acquisition() {
        let mut result = AcquisitionResult::default();
        assert_eq!(exit_code_for_acquisition(&result), ExitCode::SUCCESS);

        result
            .errors
            .push(SourceError::new(AcquisitionSource::Design, "boom"));
        assert_eq!(exit_code_for_acquisition(&result), ExitCode::from(1));
    }

    #[test]
    fn render_error_always_returns_fatal_exit_code() {
        let code = render_error(
            VauditError::Config("boom".to_string()),
            OutputFormat::Json,
            None,
        );
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn format_pretty_acquire_lists_missing_sources_and_errors() {
        let mut result = AcquisitionResult {
            performance: Some(perf()),
            ..Default::default()
        };
        result
            .errors
            .push(SourceError::new(AcquisitionSource::Design, "node 1:2 could not be exported"));
        let output = VauditOutput::acquire(inputs(), result);

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[ACQUIRE] PARTIAL"));
        assert!(pretty.contains("viewport 1440x900"));
        assert!(pretty.contains("Design:         missing"));
        assert!(pretty.contains("score 72 | FCP 1.4 s"));
        assert!(pretty.contains("- design export: node 1:2 could not be exported"));
    }

    #[test]
    fn format_pretty_audit_shows_scores_and_issues() {
        let report = normalize_report(
            r#"{"completionScore": 91, "performanceScore": 70, "rating": "A", "summary": "close match",
                "performanceSuggestions": ["Lazy-load hero image"],
                "issues": [{"category": "Spacing", "severity": "Minor", "description": "gap too wide", "suggestion": "use 16px"}]}"#,
        )
        .unwrap();
        let output = VauditOutput::Audit(AuditOutput {
            version: VAUDIT_OUTPUT_VERSION.to_string(),
            inputs: inputs(),
            performance: None,
            acquisition_errors: vec![SourceError::new(
                AcquisitionSource::Performance,
                "Lighthouse timed out",
            )],
            report,
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[AUDIT] Completion 91/100 (rating A)"));
        assert!(pretty.contains("Performance: 70/100 (estimated)"));
        assert!(pretty.contains("- Lazy-load hero image"));
        assert!(pretty.contains("Issues (1):"));
        assert!(pretty.contains("- [Minor] Spacing: gap too wide -> use 16px"));
        assert!(pretty.contains("performance audit: Lighthouse timed out"));
    }

    #[test]
    fn format_pretty_handles_errors() {
        let output = VauditOutput::error(ErrorPayload {
            category: ErrorCategory::Config,
            message: "bad input".to_string(),
            remediation: Some("check flags".to_string()),
        });

        let pretty = format_pretty(&output, false);
        assert!(pretty.contains("[ERROR] bad input"));
        assert!(pretty.contains("Hint: check flags"));
    }
}
