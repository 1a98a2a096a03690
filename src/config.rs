use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::analysis::InstructionLanguage;
use crate::browser::lighthouse::DEFAULT_PROCESS_TIMEOUT as DEFAULT_AUDIT_TIMEOUT;
use crate::browser::{
    AuditorOptions, CaptureOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_PROCESS_TIMEOUT,
    SETTLE_DELAY,
};
use crate::figma_client::{
    FigmaClient, ImageExportOptions, DEFAULT_BASE_URL, DEFAULT_TIMEOUT as DEFAULT_FIGMA_TIMEOUT,
};
use crate::Viewport;

pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;
pub const DEFAULT_VISION_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub capture: CaptureConfig,
    pub performance: PerformanceConfig,
    pub figma: FigmaConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub body_limit_bytes: usize,
    /// Allowed CORS origins. Empty means any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    pub node_command: String,
    pub viewport: Viewport,
    pub headless: bool,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
    pub max_concurrent_sessions: usize,
    pub preflight_checks: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            viewport: Viewport::default(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            max_concurrent_sessions: 4,
            preflight_checks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerformanceConfig {
    /// Run Lighthouse after a successful capture.
    pub enabled: bool,
    pub node_command: String,
    pub chrome_flags: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
    pub max_concurrent_sessions: usize,
    pub preflight_checks: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_command: "node".to_string(),
            chrome_flags: vec!["--headless".to_string(), "--no-sandbox".to_string()],
            process_timeout: DEFAULT_AUDIT_TIMEOUT,
            max_concurrent_sessions: 2,
            preflight_checks: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FigmaConfig {
    pub base_url: String,
    pub scale: f32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for FigmaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            scale: 2.0,
            timeout: DEFAULT_FIGMA_TIMEOUT,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub api_endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub language: InstructionLanguage,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_VISION_MODEL.to_string(),
            max_tokens: 4096,
            timeout: Duration::from_secs(180),
            language: InstructionLanguage::default(),
        }
    }
}

// Keeps the key out of logs.
impl std::fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .field("language", &self.language)
            .finish()
    }
}

impl Config {
    /// Loads an explicit file, else `~/.config/vaudit/config.toml` when it
    /// exists, else the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        match Self::central_config_path() {
            Some(central) if central.is_file() => Self::from_file(&central),
            _ => Ok(Self::default()),
        }
    }

    /// Parses a file as YAML when its extension says so, TOML otherwise.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            _ => Ok(toml::from_str(&text)?),
        }
    }

    pub fn central_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME").filter(|h| !h.is_empty())?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("vaudit")
                .join("config.toml"),
        )
    }

    /// Applies environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies environment overrides using `lookup`. Empty values are
    /// ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT must be a port number, got '{port}'")))?;
            self.server.bind = SocketAddr::from(([0, 0, 0, 0], port));
        }
        if let Some(bind) = get("VAUDIT_BIND") {
            self.server.bind = bind.parse().map_err(|_| {
                ConfigError::Invalid(format!("VAUDIT_BIND must be HOST:PORT, got '{bind}'"))
            })?;
        }

        if let Some(key) = get("VAUDIT_VISION_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.analysis.api_key = Some(key);
        }
        if let Some(endpoint) = get("VAUDIT_VISION_API_ENDPOINT") {
            self.analysis.api_endpoint = endpoint;
        }
        if let Some(model) = get("VAUDIT_VISION_MODEL") {
            self.analysis.model = model;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.server.body_limit_bytes == 0 {
            return invalid("server.body_limit_bytes must be greater than zero");
        }
        if self.capture.node_command.trim().is_empty() {
            return invalid("capture.node_command cannot be empty");
        }
        if self.performance.node_command.trim().is_empty() {
            return invalid("performance.node_command cannot be empty");
        }
        if self.capture.navigation_timeout.is_zero() {
            return invalid("capture.navigation_timeout must be greater than zero");
        }
        if self.capture.process_timeout <= self.capture.navigation_timeout + SETTLE_DELAY {
            return invalid(
                "capture.process_timeout must exceed capture.navigation_timeout plus the 1s settle delay",
            );
        }
        if self.performance.process_timeout.is_zero() {
            return invalid("performance.process_timeout must be greater than zero");
        }
        if self.figma.timeout.is_zero() {
            return invalid("figma.timeout must be greater than zero");
        }
        if !(self.figma.scale > 0.0 && self.figma.scale <= 4.0) {
            return invalid("figma.scale must be within (0, 4]");
        }
        if self.analysis.timeout.is_zero() {
            return invalid("analysis.timeout must be greater than zero");
        }
        if self.analysis.max_tokens == 0 {
            return invalid("analysis.max_tokens must be greater than zero");
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            node_command: self.capture.node_command.clone(),
            viewport: self.capture.viewport,
            headless: self.capture.headless,
            navigation_timeout: self.capture.navigation_timeout,
            process_timeout: self.capture.process_timeout,
            max_concurrent_sessions: self.capture.max_concurrent_sessions.max(1),
            skip_preflight: !self.capture.preflight_checks,
        }
    }

    pub fn auditor_options(&self) -> AuditorOptions {
        AuditorOptions {
            node_command: self.performance.node_command.clone(),
            chrome_flags: self.performance.chrome_flags.clone(),
            process_timeout: self.performance.process_timeout,
            max_concurrent_sessions: self.performance.max_concurrent_sessions.max(1),
            skip_preflight: !self.performance.preflight_checks,
        }
    }

    pub fn figma_client(&self) -> crate::Result<FigmaClient> {
        FigmaClient::with_base_url_and_timeout(&self.figma.base_url, self.figma.timeout)?
            .with_options(ImageExportOptions {
                scale: self.figma.scale,
            })
    }

    /// Single-line description of the settings that shape acquisitions.
    pub fn summary(&self) -> String {
        format!(
            "bind={}, viewport={}, timeouts: navigation={}s, capture={}s, lighthouse={}s, figma={}s, performance={}, analysis={} ({})",
            self.server.bind,
            self.capture.viewport,
            self.capture.navigation_timeout.as_secs(),
            self.capture.process_timeout.as_secs(),
            self.performance.process_timeout.as_secs(),
            self.figma.timeout.as_secs(),
            if self.performance.enabled { "on" } else { "off" },
            if self.analysis.api_key.is_some() { "configured" } else { "disabled" },
            self.analysis.model,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.server.bind.port(), 3000);
        assert_eq!(cfg.server.body_limit_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.capture.viewport.width, 1440);
        assert_eq!(cfg.capture.viewport.height, 900);
        assert_eq!(cfg.capture.navigation_timeout, Duration::from_secs(60));
        assert!((cfg.figma.scale - 2.0).abs() < f32::EPSILON);
        assert!(cfg.analysis.api_key.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_toml_with_humantime_durations() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[server]
bind = "0.0.0.0:8080"
cors_origins = ["http://localhost:5173"]

[capture]
viewport = "1280x720"
navigation_timeout = "45s"
process_timeout = "2m"

[analysis]
language = "zh"
"#
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.server.bind.port(), 8080);
        assert_eq!(cfg.server.cors_origins, vec!["http://localhost:5173"]);
        assert_eq!(cfg.capture.viewport.width, 1280);
        assert_eq!(cfg.capture.navigation_timeout, Duration::from_secs(45));
        assert_eq!(cfg.capture.process_timeout, Duration::from_secs(120));
        assert_eq!(cfg.analysis.language, InstructionLanguage::Chinese);
        assert_eq!(cfg.performance.process_timeout, DEFAULT_AUDIT_TIMEOUT);
    }

    #[test]
    fn loads_yaml_by_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        write!(
            file,
            "performance:\n  enabled: false\n  chrome_flags: [\"--headless=new\"]\nfigma:\n  scale: 1\n"
        )
        .unwrap();

        let cfg = Config::load(Some(file.path())).unwrap();
        assert!(!cfg.performance.enabled);
        assert_eq!(cfg.performance.chrome_flags, vec!["--headless=new"]);
        assert!((cfg.figma.scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(file, "[capture]\nnav_timeout = \"5s\"\n").unwrap();

        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn capture_process_timeout_must_cover_the_settle_delay() {
        let mut cfg = Config::default();
        cfg.capture.navigation_timeout = Duration::from_secs(30);
        cfg.capture.process_timeout = Duration::from_millis(30_500);

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("settle delay"), "{err}");

        cfg.capture.process_timeout = Duration::from_secs(35);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn env_overrides_file_values() {
        let mut cfg = Config::default();
        cfg.analysis.api_key = Some("from-file".into());

        cfg.apply_env_from(env(&[
            ("PORT", "4000"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("VAUDIT_VISION_API_KEY", "sk-vaudit"),
            ("VAUDIT_VISION_MODEL", "gpt-4.1"),
        ]))
        .unwrap();

        assert_eq!(cfg.server.bind, "0.0.0.0:4000".parse().unwrap());
        assert_eq!(cfg.analysis.api_key.as_deref(), Some("sk-vaudit"));
        assert_eq!(cfg.analysis.model, "gpt-4.1");
    }

    #[test]
    fn explicit_bind_wins_over_port() {
        let mut cfg = Config::default();
        cfg.apply_env_from(env(&[("PORT", "4000"), ("VAUDIT_BIND", "127.0.0.1:9999")]))
            .unwrap();
        assert_eq!(cfg.server.bind.port(), 9999);
    }

    #[test]
    fn invalid_env_values_are_reported() {
        let mut cfg = Config::default();
        let err = cfg.apply_env_from(env(&[("PORT", "http")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn validate_rejects_inconsistent_timeouts() {
        let mut cfg = Config::default();
        cfg.capture.process_timeout = Duration::from_secs(30);
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.figma.scale = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.capture.node_command = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let mut cfg = Config::default();
        cfg.analysis.api_key = Some("sk-secret".into());
        let debug = format!("{:?}", cfg);
        assert!(!debug.contains("sk-secret"));
        assert!(cfg.summary().contains("analysis=configured"));
    }
}
