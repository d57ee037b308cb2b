use std::process::ExitCode;

use envconfig::Envconfig;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use basket::config::Config;

mod telemetry;

/// Resolves on SIGINT or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => info!("received SIGINT, draining connections"),
        _ = terminate => info!("received SIGTERM, draining connections"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::init_from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    telemetry::init(&config);

    let listener = match TcpListener::bind(config.address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(address = %config.address, "could not bind: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let status = match basket::server::serve(config, listener, shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("basket failed to start: {:#}", err);
            ExitCode::FAILURE
        }
    };

    telemetry::shutdown();
    status
}
