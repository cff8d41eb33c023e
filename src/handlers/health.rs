// handlers/health.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::database::partition::PartitionBackend;

pub async fn root() -> Json<Value> {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ok",
    }))
}

/// GET /health - shared store reachability plus pool cache size
///
/// Returns 503 while the shared store is unreachable so load balancers
/// take the instance out of rotation.
pub async fn health<B: PartitionBackend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    let cached_partitions = state.router.cached_slugs().await.len();

    match state.tenants.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "up",
                "cached_partitions": cached_partitions,
            })),
        ),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "down",
                    "cached_partitions": cached_partitions,
                })),
            )
        }
    }
}
