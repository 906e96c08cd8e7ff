//! File upload and download handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::Value;
use tracing::debug;

use crate::database::ListParams;
use crate::services::AuthContext;
use crate::state::AppState;
use crate::utils::errors::{MemberHubError, Result};

/// GET /files
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let page = state.services.resource_service.list(&ctx, "files", &params).await?;
    Ok(Json(page.to_json()))
}

/// POST /files, multipart with the upload in the `data` part
pub async fn upload(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>)> {
    let invalid = |e: axum::extract::multipart::MultipartError| MemberHubError::InvalidInput(e.body_text());

    let mut name_override = None;
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        match field.name() {
            Some("data") | Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(invalid)?;
                upload = Some((file_name, content_type, bytes));
            }
            Some("name") => {
                name_override = Some(field.text().await.map_err(invalid)?);
            }
            other => debug!(field = ?other, "Ignoring multipart field"),
        }
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| MemberHubError::issue("data", "required field"))?;
    let document = state
        .services
        .resource_service
        .upload(&ctx, name_override.or(file_name), content_type.as_deref(), &bytes)
        .await?;

    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /storage/{name}
pub async fn download(State(state): State<AppState>, Path(name): Path<String>) -> Result<Response> {
    let (file, bytes) = state.services.media_service.load(&name).await?;
    let disposition = format!(
        "inline; filename=\"{}\"",
        file.name.as_deref().unwrap_or(&file.storage_name).replace('"', "")
    );

    Ok((
        [
            (
                header::CONTENT_TYPE,
                file.content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
