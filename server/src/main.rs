//! coascan HTTP server.
//!
//! Usage: `coascan-server [config.json]`. Without an argument the path is
//! taken from `COA_CONFIG`; without either, defaults plus `COA_*`
//! environment overrides are used. `COA_LOG_FORMAT=json` switches to JSON
//! logs.

mod error;
mod routes;
mod state;

use std::process::ExitCode;

use tracing::{error, info};

use coascan::logging::{self, LogFormat};
use coascan::{load_config, load_default_config, CoaConfig, CoaError};

use crate::state::AppState;

fn load(path: Option<String>) -> Result<CoaConfig, CoaError> {
    let config = match path {
        Some(path) => {
            info!(path = %path, "Loading config");
            load_config(&path)?
        }
        None => {
            info!("No config file given, using defaults and environment");
            load_default_config()?
        }
    };
    Ok(config)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let format = match std::env::var("COA_LOG_FORMAT")
        .unwrap_or_default()
        .parse::<LogFormat>()
    {
        Ok(format) => format,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = logging::init(format) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COA_CONFIG").ok().filter(|p| !p.is_empty()));
    let config = match load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let state = match AppState::from_config(&config) {
        Ok(state) => state,
        Err(e) => {
            error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind(&config.bind).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(bind = %config.bind, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(bind = %config.bind, bucket = %config.bucket, "coascan server listening");

    if let Err(e) = axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}
