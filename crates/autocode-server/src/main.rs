//! AutoCode server - HTTP/WebSocket backend for tmux-hosted work sessions.

use anyhow::Result;
use autocode_server::{config, logging, router, state};
use axum::http::HeaderValue;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use config::Config;
use logging::{LogConfig, LogFormat};
use state::AppState;

/// AutoCode server - long-running Claude sessions for projects and research.
#[derive(Parser, Debug)]
#[command(name = "autocode-server")]
#[command(about = "HTTP/WebSocket server for tmux-hosted Claude work sessions")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override port from config
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the workspace root from config
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging (INFO level for every target)
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging (TRACE level for everything)
    #[arg(long)]
    trace: bool,

    /// Quiet mode (WARN and ERROR only)
    #[arg(short, long)]
    quiet: bool,

    /// Set log level for specific targets (e.g., "work_loop=debug").
    /// Can be specified multiple times. Targets are prefixed with "autocode::" automatically.
    #[arg(long = "log", value_name = "TARGET=LEVEL")]
    log_overrides: Vec<String>,

    /// Log output format
    #[arg(long = "log-format", value_name = "FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::from_cli(
        cli.verbose,
        cli.debug,
        cli.trace,
        cli.quiet,
        cli.log_overrides,
        cli.log_format,
    );
    logging::init(&log_config);

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    tracing::info!(
        target: "autocode::startup",
        "Loaded configuration (port: {}, data dir: {:?})",
        config.port,
        config.data_dir
    );

    let state = Arc::new(AppState::new(config.clone())?);
    tracing::info!(target: "autocode::startup", "Initialized application state");

    match state.work_manager.reconcile_orphans().await {
        Ok(count) => tracing::info!(target: "autocode::startup", "Reconciled contexts ({} orphaned)", count),
        Err(e) => tracing::error!(target: "autocode::startup", "Failed to reconcile orphaned contexts: {}", e),
    }

    let app = router(state.clone())
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(target: "autocode::startup", "Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(target: "autocode::startup", "Stopping background tasks");
    state.work_manager.shutdown().await;
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(target: "autocode::startup", "Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "autocode::startup", "Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "autocode::startup", "Failed to listen for SIGTERM: {}", e);
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
    tracing::info!(target: "autocode::startup", "Shutdown signal received");
}
