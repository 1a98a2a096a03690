use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{debug, warn};
use vaudit_lib::output::AuditOutput;
use vaudit_lib::{
    perform_audit, AcquisitionOrchestrator, AcquisitionResult, AuditRequest, FigmaAuth, InstructionLanguage,
    VauditError, VauditOutput, VisionClient, VAUDIT_OUTPUT_VERSION,
};

use crate::cli::{OutputFormat, TargetArgs};
use crate::formatting::{render_error, write_output};
use crate::settings::{
    apply_target_overrides, build_request, format_effective_config, inputs, load_config,
};

/// Run the audit command: acquire both sides, analyse, print the report.
///
/// Exits with 1 when the acquisition did not yield both images, since no
/// comparison is possible then.
pub async fn run_audit(
    config_path: Option<PathBuf>,
    target: TargetArgs,
    language: Option<InstructionLanguage>,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    apply_target_overrides(&mut config, &target);
    if let Some(language) = language {
        config.analysis.language = language;
    }
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    if target.figma_url.is_none() || target.preview_url.is_none() {
        return render_error(
            VauditError::validation("an audit needs both --figma-url and --preview-url"),
            format,
            output,
        );
    }

    let backend = match VisionClient::from_config(&config.analysis) {
        Ok(Some(client)) => client,
        Ok(None) => {
            return render_error(
                VauditError::Config("vision API key is not configured".to_string()),
                format,
                output,
            )
        }
        Err(err) => return render_error(err, format, output),
    };

    let orchestrator = match AcquisitionOrchestrator::from_config(&config) {
        Ok(o) => o,
        Err(err) => return render_error(err, format, output),
    };
    let request = build_request(&target, &config, FigmaAuth::from_env());
    let result = match orchestrator.acquire(&request).await {
        Ok(result) => result,
        Err(err) => return render_error(err, format, output),
    };

    let inputs = inputs(&target, &config);
    let AcquisitionResult {
        design_artifact,
        implementation_artifact,
        performance,
        errors,
    } = result;
    let (design, implementation) = match (design_artifact, implementation_artifact) {
        (Some(design), Some(implementation)) => (design, implementation),
        (design_artifact, implementation_artifact) => {
            let partial = AcquisitionResult {
                design_artifact,
                implementation_artifact,
                performance,
                errors,
            };
            warn!(errors = %partial.error_summary(), "audit not possible");
            let body = VauditOutput::acquire(inputs, partial);
            if let Err(err) = write_output(&body, format, output.clone()) {
                return render_error(VauditError::Config(err.to_string()), format, output);
            }
            return ExitCode::from(1);
        }
    };

    let audit_request = match AuditRequest::new(design, implementation, performance.clone()) {
        Ok(r) => r.with_language(config.analysis.language),
        Err(err) => return render_error(err, format, output),
    };
    let report = match perform_audit(&backend, &audit_request).await {
        Ok(report) => report,
        Err(err) => return render_error(err, format, output),
    };

    let body = VauditOutput::Audit(AuditOutput {
        version: VAUDIT_OUTPUT_VERSION.to_string(),
        inputs,
        performance,
        acquisition_errors: errors,
        report,
    });
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VauditError::Config(err.to_string()), format, output);
    }
    ExitCode::SUCCESS
}
