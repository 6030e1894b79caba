//! System endpoints: health check and the wire-key table.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::reconcile::wire_keys::{self, WireKeyInfo};

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    version: String,
}

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health status, version, and current timestamp.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// `GET /config/wire-keys`: The station record wire-key table.
#[utoipa::path(
    get,
    path = "/config/wire-keys",
    tag = "System",
    summary = "List station wire keys",
    description = "Returns every recognized wire key of a raw station record and where its value is stored. Keys not listed are counted as unknown and dropped.",
    responses(
        (status = 200, description = "Wire-key table", body = Vec<WireKeyInfo>),
    )
)]
pub async fn wire_keys_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(wire_keys::catalog()))
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/config/wire-keys", get(wire_keys_handler))
}
