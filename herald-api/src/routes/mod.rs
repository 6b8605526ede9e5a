//! Router assembly.

pub mod health;
pub mod notifications;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::metrics_handler;
use crate::ws::ws_handler;

fn cors_layer(config: &ServerConfig) -> ApiResult<CorsLayer> {
    if config.cors_origins.is_empty() {
        return Ok(CorsLayer::permissive());
    }
    let origins = config
        .cors_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|_| ApiError::invalid_input(format!("Invalid CORS origin: {}", origin)))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

/// Build the full HTTP router.
pub fn create_api_router(state: AppState, config: &ServerConfig) -> ApiResult<Router> {
    let router = Router::new()
        .nest("/api/notifications", notifications::create_router())
        .route("/ws", get(ws_handler))
        .route("/health", get(health::health))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config)?)
        .with_state(state);
    Ok(router)
}
