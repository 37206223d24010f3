use anyhow::Context;
use fluxwatch_sidecar::server::{self, AppState};
use fluxwatch_sidecar::supervisor::WatcherSupervisor;
use fluxwatch_sidecar::{ControlChannel, LogBroadcaster, SidecarConfig, ensure_data_dir};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = config_from_env()?;
    config.validate()?;

    let data_dir = ensure_data_dir(&config)?;
    info!(dir = %data_dir.display(), "Using data directory");

    let broadcaster = Arc::new(LogBroadcaster::new(
        config.history_capacity,
        config.subscriber_buffer,
    ));
    let supervisor = Arc::new(WatcherSupervisor::new(config.clone(), broadcaster.clone()));

    // A watcher that fails to launch is reported as not_running; it does
    // not take the host down.
    if let Err(e) = supervisor.start().await {
        error!(error = %e, "Watcher failed to launch");
    }

    // The parent process owns our stdin and may order a shutdown at any
    // time. The token is the single signal observed here, the only place
    // that exits the process.
    let shutdown = CancellationToken::new();
    tokio::spawn(ControlChannel::new(shutdown.clone()).run_stdin());

    let state = AppState {
        supervisor: supervisor.clone(),
        broadcaster,
        config: config.clone(),
        data_dir,
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], config.bind_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Sidecar API listening");

    let drain_token = shutdown.clone();
    let mut server_task = tokio::spawn(
        axum::serve(listener, server::router(state))
            .with_graceful_shutdown(async move { drain_token.cancelled().await })
            .into_future(),
    );

    tokio::select! {
        result = &mut server_task => {
            supervisor.shutdown().await;
            result??;
            return Ok(());
        }
        _ = shutdown.cancelled() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    }

    // Shutdown ordered: stop the watcher, give the HTTP layer a bounded
    // drain, then take the whole process down regardless of in-flight
    // work.
    supervisor.shutdown().await;
    if tokio::time::timeout(config.drain_timeout(), &mut server_task)
        .await
        .is_err()
    {
        warn!("HTTP drain timed out, exiting anyway");
    }
    info!("Sidecar exiting");
    std::process::exit(0);
}

/// Configuration comes from the environment so the packaging layer can
/// point the sidecar at its watcher without a config file.
fn config_from_env() -> anyhow::Result<SidecarConfig> {
    let mut builder = SidecarConfig::builder();

    builder.watcher_command(
        std::env::var("FLUXWATCH_WATCHER").unwrap_or_else(|_| "python3".to_string()),
    );
    match std::env::var("FLUXWATCH_WATCHER_ARGS") {
        Ok(args) => {
            builder.watcher_args(args.split_whitespace());
        }
        Err(_) => {
            builder.watcher_args(["fluctuation.py"]);
        }
    }

    if let Ok(dir) = std::env::var("FLUXWATCH_WATCHER_DIR") {
        builder.working_directory(PathBuf::from(dir));
    }
    if let Ok(port) = std::env::var("FLUXWATCH_PORT") {
        builder.bind_port(
            port.parse::<u16>()
                .context("FLUXWATCH_PORT must be a port number")?,
        );
    }
    if let Ok(dir) = std::env::var("FLUXWATCH_DATA_DIR") {
        builder.data_dir(PathBuf::from(dir));
    }

    builder.build().context("Invalid sidecar configuration")
}
