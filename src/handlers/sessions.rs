//! Session handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use axum::body::Bytes;
use serde_json::Value;

use crate::database::query::with_etag;
use crate::database::ListParams;
use crate::handlers::parse_json;
use crate::models::LoginRequest;
use crate::services::AuthContext;
use crate::state::AppState;
use crate::utils::errors::Result;

/// POST /sessions
pub async fn login(State(state): State<AppState>, body: Bytes) -> Result<(StatusCode, Json<Value>)> {
    let request: LoginRequest = parse_json(&body)?;
    state.login_limiter.check(&request.username)?;

    let session = state.services.auth_service.login(&request).await?;

    Ok((StatusCode::CREATED, Json(with_etag(serde_json::to_value(&session)?))))
}

/// GET /sessions
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let page = state.services.resource_service.list(&ctx, "sessions", &params).await?;
    Ok(Json(page.to_json()))
}
