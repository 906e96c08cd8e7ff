//! Health, schema and role handlers

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    match state.database.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok", "version": crate::VERSION}))),
        Err(e) => {
            error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "version": crate::VERSION})),
            )
        }
    }
}

/// GET /docs
pub async fn docs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.services.resource_service.docs())
}

/// GET /roles
pub async fn roles(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.services.resource_service.roles())
}
