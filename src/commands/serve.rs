use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{debug, error};
use vaudit_lib::{serve, AppState};

use crate::settings::{format_effective_config, load_config};

/// Run the HTTP service until Ctrl-C.
pub async fn run_serve(config_path: Option<PathBuf>, bind: Option<SocketAddr>) -> ExitCode {
    let mut config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "cannot start server");
            eprintln!("{}", err.to_payload().message);
            return ExitCode::from(2);
        }
    };
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    debug!("{}", format_effective_config(&config, config_path.as_deref()));

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(err) => {
            error!(error = %err, "cannot build application state");
            return ExitCode::from(2);
        }
    };

    match serve(state, config.server.bind).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, bind = %config.server.bind, "server failed");
            ExitCode::from(2)
        }
    }
}
