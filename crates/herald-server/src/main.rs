//! herald - assignment fulfillment server
//!
//! 起動順:
//! 1. config を読む（herald.toml + HERALD_* 環境変数）
//! 2. tracing を初期化
//! 3. AppBuilder で Dispatcher を組み立てる
//! 4. intake を listen し、シグナルで受付停止 → 実行中 job の完了を待つ

mod intake;

use std::process::ExitCode;

use herald_core::app::{AppBuilder, BuildError, Dispatcher};
use herald_core::config::{ConfigError, HeraldConfig};
use herald_core::observability::{init_tracing, LogFormat};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::intake::{router, AppState, HealthInfo};

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("startup: {0}")]
    Build(#[from] BuildError),

    #[error("listener: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match HeraldConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(LogFormat::default(), "info");
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.server.log_format, &config.server.log_level);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server exited with error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: HeraldConfig) -> Result<(), ServerError> {
    let addr = config.bind_addr()?;
    let dispatcher = AppBuilder::from_config(&config).build()?;

    let state = AppState {
        dispatcher: dispatcher.clone(),
        shared_secret: config.server.shared_secret.clone(),
        health: HealthInfo::from_config(&config),
    };

    let listener = TcpListener::bind(addr).await?;
    info!(
        %addr,
        generator = dispatcher.generator_name(),
        publisher = dispatcher.publisher_name(),
        "herald listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(stop_intake(dispatcher.clone()))
        .await?;

    drain(&dispatcher).await;
    Ok(())
}

/// Resolves on the first signal and stops the dispatcher from taking new jobs.
async fn stop_intake(dispatcher: Dispatcher) {
    shutdown_signal().await;
    info!("shutdown requested");
    dispatcher.shutdown();
}

/// Waits for in-flight jobs; a second signal abandons them.
async fn drain(dispatcher: &Dispatcher) {
    let active = dispatcher.active_jobs();
    if active == 0 {
        return;
    }
    info!(active, "waiting for in-flight jobs");
    tokio::select! {
        _ = dispatcher.wait_idle() => info!("all jobs finished"),
        _ = shutdown_signal() => warn!(active = dispatcher.active_jobs(), "forced exit with jobs in flight"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
