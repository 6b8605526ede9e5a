//! Herald API Server Entry Point
//!
//! Bootstraps configuration and telemetry, opens the snapshot cache and
//! starts the Axum HTTP server.

use std::sync::Arc;

use herald_api::telemetry::{init_tracing, TelemetryConfig};
use herald_api::{create_api_router, ApiError, ApiResult, AppState, ServerConfig};
use herald_storage::InMemoryNotificationStore;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let config = ServerConfig::from_env()?;
    let addr = config.bind_addr()?;

    let store = Arc::new(InMemoryNotificationStore::new());
    let state = AppState::from_config(&config, store)?;
    let app = create_api_router(state, &config)?;

    tracing::info!(
        %addr,
        cache_ttl_secs = config.cache_ttl.as_secs(),
        cache_backend = ?config.cache_backend,
        "Starting Herald API server"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}
