mod cli;
mod commands;
mod formatting;
mod logging;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::{run_acquire, run_audit, run_serve};

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let args = cli::parse();
    logging::init_tracing(args.verbose, args.log_json);

    match args.command {
        Commands::Serve { bind } => run_serve(args.config, bind).await,
        Commands::Acquire {
            target,
            format,
            output,
        } => run_acquire(args.config, target, format, output).await,
        Commands::Audit {
            target,
            language,
            format,
            output,
        } => run_audit(args.config, target, language, format, output).await,
    }
}
