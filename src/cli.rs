use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use vaudit_lib::{InstructionLanguage, Viewport};

#[derive(Parser)]
#[command(name = "vaudit")]
#[command(
    version,
    about = "VisionAudit - acquire design exports, page captures and performance data for visual audits",
    long_about = "VisionAudit (vaudit)\n\nModes:\n- serve: run the HTTP service used by the audit dashboard.\n- acquire: export a Figma frame and/or capture and measure a preview URL once.\n- audit: acquire both sides, run the vision analysis and print the normalized report.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose (debug) logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines on stderr")]
    pub log_json: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML or YAML); defaults to ~/.config/vaudit/config.toml. CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP service
    Serve {
        #[arg(long, value_name = "HOST:PORT", help = "Bind address (overrides config/PORT)")]
        bind: Option<SocketAddr>,
    },

    /// Acquire the design export, page capture and performance data once
    Acquire {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },

    /// Acquire both sides and run the vision analysis
    Audit {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, help = "Report language (en, zh); defaults to analysis.language")]
        language: Option<InstructionLanguage>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    #[arg(long, help = "Figma frame link (must include node-id)")]
    pub figma_url: Option<String>,

    #[arg(
        long,
        help = "Figma personal access token (falls back to FIGMA_TOKEN / FIGMA_OAUTH_TOKEN)"
    )]
    pub figma_token: Option<String>,

    #[arg(long, help = "Implementation URL to capture and measure")]
    pub preview_url: Option<String>,

    #[arg(long, help = "Viewport dimensions (WIDTHxHEIGHT); defaults to capture.viewport")]
    pub viewport: Option<Viewport>,

    #[arg(long, help = "Skip the Lighthouse performance audit")]
    pub no_performance: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
