//! Health check endpoint. No identity required.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::broadcast::BroadcastChannel;
use crate::services::ChangeProcessor;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connected_sessions: usize,
    pub cache: CacheHealth,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
    pub hit_rate: f64,
}

/// GET /health
pub async fn health(
    State(processor): State<Arc<ChangeProcessor>>,
    State(broadcast): State<Arc<BroadcastChannel>>,
    State(start_time): State<Instant>,
) -> Json<HealthResponse> {
    let stats = processor.snapshots().cache_stats();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        connected_sessions: broadcast.session_count(),
        cache: CacheHealth {
            hits: stats.hits,
            misses: stats.misses,
            entries: stats.entry_count,
            hit_rate: stats.hit_rate(),
        },
    })
}
