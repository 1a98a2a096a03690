use std::path::PathBuf;
use std::process::ExitCode;

use tracing::debug;
use vaudit_lib::{AcquisitionOrchestrator, FigmaAuth, VauditError, VauditOutput};

use crate::cli::{OutputFormat, TargetArgs};
use crate::formatting::{exit_code_for_acquisition, render_error, write_output};
use crate::settings::{
    apply_target_overrides, build_request, format_effective_config, inputs, load_config,
};

/// Run the acquire command.
pub async fn run_acquire(
    config_path: Option<PathBuf>,
    target: TargetArgs,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output),
    };
    apply_target_overrides(&mut config, &target);
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    let orchestrator = match AcquisitionOrchestrator::from_config(&config) {
        Ok(o) => o,
        Err(err) => return render_error(err, format, output),
    };
    let request = build_request(&target, &config, FigmaAuth::from_env());

    let result = match orchestrator.acquire(&request).await {
        Ok(result) => result,
        Err(err) => return render_error(err, format, output),
    };
    // Nothing acquired at all is fatal, but the per-source errors are still
    // printed.
    let code = if result.has_no_artifacts() {
        ExitCode::from(2)
    } else {
        exit_code_for_acquisition(&result)
    };
    let body = VauditOutput::acquire(inputs(&target, &config), result);
    if let Err(err) = write_output(&body, format, output.clone()) {
        return render_error(VauditError::Config(err.to_string()), format, output);
    }
    code
}
