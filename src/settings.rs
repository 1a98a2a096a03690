use std::path::Path;

use vaudit_lib::{AcquisitionRequest, Config, FigmaAuth, Inputs, VauditError};

use crate::cli::TargetArgs;

/// Load config from a file, central config, or defaults, then apply
/// environment overrides and validate.
/// Priority: explicit path > ~/.config/vaudit/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, VauditError> {
    let location = || {
        path.map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string())
    };

    let mut cfg = Config::load(path).map_err(|e| {
        VauditError::Config(format!("Failed to read config {}: {}", location(), e))
    })?;

    cfg.apply_env()
        .map_err(|e| VauditError::Config(format!("Invalid environment override: {}", e)))?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        VauditError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Applies the flags that change how sources are acquired.
pub fn apply_target_overrides(config: &mut Config, target: &TargetArgs) {
    if let Some(viewport) = target.viewport {
        config.capture.viewport = viewport;
    }
    if target.no_performance {
        config.performance.enabled = false;
    }
}

/// Builds the acquisition request. A token on the command line wins over
/// `env_auth`.
pub fn build_request(
    target: &TargetArgs,
    config: &Config,
    env_auth: Option<FigmaAuth>,
) -> AcquisitionRequest {
    let auth = FigmaAuth::from_token(target.figma_token.as_deref()).or(env_auth);
    let mut request = AcquisitionRequest::new();
    if let Some(figma_url) = &target.figma_url {
        request = request.with_design(figma_url.clone(), auth);
    }
    if let Some(preview_url) = &target.preview_url {
        request = request.with_preview(preview_url.clone());
    }
    if !config.performance.enabled {
        request = request.without_performance();
    }
    request
}

pub fn inputs(target: &TargetArgs, config: &Config) -> Inputs {
    Inputs {
        figma_url: target.figma_url.clone(),
        preview_url: target.preview_url.clone(),
        viewport: config.capture.viewport,
    }
}

/// Format effective config as a single-line string.
pub fn format_effective_config(config: &Config, config_source: Option<&Path>) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    format!("Effective config [{source}]: {}", config.summary())
}
