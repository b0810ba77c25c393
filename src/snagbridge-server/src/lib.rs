//! Snagbridge Server - HTTP front door for the error-card bridge.
//!
//! This crate provides:
//! - `POST /webhook` for error-tracker deliveries
//! - `POST /actions` for interactive card buttons
//! - `/api/v1` admin endpoints for routing rules and user mappings
//! - the background reconciliation loop, started and stopped with the server

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod api;
pub mod config;
pub mod error;
pub mod middleware;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::ServerConfig;
pub use error::{AppError, AppResult};
pub use state::AppState;

/// Run the server until `shutdown` resolves.
pub async fn run_with_shutdown<F>(config: ServerConfig, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let (_reload_tx, reload_rx) = mpsc::channel(1);
    run_with_reload(config, shutdown, reload_rx).await
}

/// Run the server, applying every configuration received on `reloads`.
pub async fn run_with_reload<F>(
    config: ServerConfig,
    shutdown: F,
    mut reloads: mpsc::Receiver<ServerConfig>,
) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    if !config.webhook_auth().is_enabled() {
        warn!("Webhook authentication is disabled!");
        warn!("Anyone who can reach /webhook can post error cards.");
        warn!("Set webhook.token or webhook.secret to require a token.");
    }

    let state = Arc::new(AppState::from_config(&config).await?);
    if state.start_sync(config.sync_interval()).await {
        info!(interval_secs = config.sync_interval_secs, "Reconciliation loop started");
    } else {
        info!("Reconciliation loop disabled");
    }

    let reload_state = Arc::clone(&state);
    let reloader = tokio::spawn(async move {
        while let Some(config) = reloads.recv().await {
            reload_state.reload(&config).await;
        }
    });

    let app = create_router(Arc::clone(&state));
    let addr: SocketAddr = config.listen_addr.parse()?;
    info!("Starting snagbridge server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    info!("Server shutting down, stopping reconciliation...");
    reloader.abort();
    state.shutdown().await;

    served?;
    Ok(())
}

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(api::integration_routes())
        .nest("/api/v1", api::routes())
        .layer(axum::middleware::from_fn(middleware::timing_middleware))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
