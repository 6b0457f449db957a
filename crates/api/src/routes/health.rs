//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::app::AppState;
use crate::config::StorageBackend;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageBackend,
    /// Absent with the in-memory backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
    pub realtime_topics: usize,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Simple status response for liveness/readiness checks.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

async fn check_database(pool: &PgPool) -> DatabaseHealth {
    let start = std::time::Instant::now();
    let connected = sqlx::query("SELECT 1").execute(pool).await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    DatabaseHealth {
        connected,
        latency_ms: connected.then_some(latency_ms),
    }
}

/// Full health check endpoint.
///
/// GET /api/health
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let database = match &state.pool {
        Some(pool) => Some(check_database(pool).await),
        None => None,
    };
    let healthy = database.as_ref().map_or(true, |db| db.connected);

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: state.config.storage.backend,
        database,
        realtime_topics: state.hub.topic_count(),
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Liveness check endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness check endpoint.
///
/// Returns 200 OK once the store can take traffic.
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    if let Some(pool) = &state.pool {
        persistence::metrics::record_pool_metrics(pool);
        if !check_database(pool).await.connected {
            return Err(StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    Ok(Json(StatusResponse {
        status: "ready".to_string(),
    }))
}
