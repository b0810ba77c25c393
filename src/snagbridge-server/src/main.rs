//! Snagbridge Server - HTTP server binary.

use std::process::ExitCode;

use clap::Parser;
use snagbridge_server::{ServerConfig, run_with_reload};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Snagbridge Server
#[derive(Parser)]
#[command(name = "snagbridge-server")]
#[command(about = "Bridges Bugsnag error webhooks to Mattermost cards")]
#[command(version)]
struct Args {
    /// Configuration file path (JSON). Without it, SNAGBRIDGE_* variables are used.
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address, overrides the configured one
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level, overrides the configured one
    #[arg(long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,
}

fn setup_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

fn load_config(path: Option<&str>, listen: Option<&str>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::from_env()?,
    };
    if let Some(listen) = listen {
        config.listen_addr = listen.to_string();
        config.validate()?;
    }
    Ok(config)
}

#[cfg(unix)]
async fn watch_reloads(path: Option<String>, listen: Option<String>, tx: mpsc::Sender<ServerConfig>) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGHUP handler, reload disabled: {}", e);
            return;
        }
    };
    while hangup.recv().await.is_some() {
        info!("Received SIGHUP, reloading configuration");
        match load_config(path.as_deref(), listen.as_deref()) {
            Ok(config) => {
                if tx.send(config).await.is_err() {
                    return;
                }
            }
            Err(e) => error!("Reload failed, keeping current configuration: {:#}", e),
        }
    }
}

#[cfg(not(unix))]
async fn watch_reloads(_: Option<String>, _: Option<String>, _tx: mpsc::Sender<ServerConfig>) {}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let loaded = load_config(args.config.as_deref(), args.listen.as_deref());
    let (level, json) = match &loaded {
        Ok(config) => (
            args.log_level.clone().unwrap_or_else(|| config.logging.level.clone()),
            args.json_logs || config.logging.format.eq_ignore_ascii_case("json"),
        ),
        Err(_) => (
            args.log_level.clone().unwrap_or_else(|| "info".to_string()),
            args.json_logs,
        ),
    };
    setup_logging(&level, json);

    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            match &args.config {
                Some(path) => error!("Failed to load config from {}: {:#}", path, e),
                None => error!("Failed to load config from environment: {:#}", e),
            }
            return ExitCode::FAILURE;
        }
    };

    info!("Starting snagbridge server on {}", config.listen_addr);
    info!("Press Ctrl+C to stop");

    let (reload_tx, reload_rx) = mpsc::channel(1);
    tokio::spawn(watch_reloads(args.config.clone(), args.listen.clone(), reload_tx));

    let shutdown = async {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut s) => {
                    s.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
            _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
        }
    };

    if let Err(e) = run_with_reload(config, shutdown, reload_rx).await {
        error!("Server error: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}
