//! Confirmation handler

use axum::{extract::State, http::StatusCode, Json};
use axum::body::Bytes;
use serde_json::Value;

use crate::handlers::parse_json;
use crate::models::ConfirmRequest;
use crate::state::AppState;
use crate::utils::errors::Result;

/// POST /confirms
pub async fn confirm(State(state): State<AppState>, body: Bytes) -> Result<(StatusCode, Json<Value>)> {
    let request: ConfirmRequest = parse_json(&body)?;
    let document = state.services.resource_service.confirm(&request.token).await?;
    Ok((StatusCode::CREATED, Json(document)))
}
