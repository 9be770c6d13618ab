mod adapters;
mod app;
mod config;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::adapters::{LayerPublisher, RendererAdapter};
use crate::config::MapConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = config::config_path();
    let map_config = match MapConfig::load(&config_path) {
        Ok(map_config) => Arc::new(map_config),
        Err(e) => {
            tracing::error!(error = %e, "invalid claim map configuration");
            return;
        }
    };
    tracing::info!(
        path = %config_path.display(),
        backends = map_config.backends.len(),
        refresh_interval_secs = map_config.refresh_interval_secs,
        "configuration loaded"
    );

    let state = AppState::new();

    // Spawn background services
    tokio::spawn(services::claim_loader::run(
        state.clone(),
        config::claims_url(),
        config::claims_refresh_interval(),
    ));
    for backend in &map_config.backends {
        if !backend.enabled {
            tracing::info!(backend = %backend.kind, "backend disabled, its batches will be discarded");
        }
        let adapter: Arc<dyn RendererAdapter> = Arc::new(LayerPublisher::new(
            backend.kind,
            backend.capabilities(),
            backend.enabled,
            Arc::clone(&state.layers),
        ));
        tokio::spawn(services::marker_refresher::run(
            state.clone(),
            adapter,
            Arc::clone(&map_config),
        ));
    }

    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("claim map server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
