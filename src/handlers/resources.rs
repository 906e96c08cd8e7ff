//! Generic resource handlers

use axum::{
    extract::{Path, Query, State},
    http::{
        header::{ACCEPT_LANGUAGE, ETAG, IF_MATCH},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum::body::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::database::ListParams;
use crate::handlers::parse_json;
use crate::services::{AuthContext, Outcome};
use crate::state::AppState;
use crate::utils::errors::Result;

#[derive(Debug, Default, Deserialize)]
pub struct ItemParams {
    pub projection: Option<String>,
}

fn header<'a>(headers: &'a HeaderMap, name: axum::http::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// JSON document with its etag mirrored into the `ETag` header
fn document_response(status: StatusCode, document: Value) -> Response {
    let etag = document
        .get("_etag")
        .and_then(Value::as_str)
        .and_then(|etag| HeaderValue::from_str(&format!("\"{}\"", etag)).ok());

    let mut response = (status, Json(document)).into_response();
    if let Some(etag) = etag {
        response.headers_mut().insert(ETAG, etag);
    }
    response
}

fn outcome_response(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Applied(Some(document)) => document_response(StatusCode::CREATED, document),
        Outcome::Applied(None) => StatusCode::NO_CONTENT.into_response(),
        Outcome::Deferred(message) => (
            StatusCode::ACCEPTED,
            Json(json!({"_status": "ACCEPTED", "message": message})),
        )
            .into_response(),
    }
}

/// GET /{resource}
pub async fn list(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(resource): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>> {
    let page = state.services.resource_service.list(&ctx, &resource, &params).await?;
    Ok(Json(page.to_json()))
}

/// POST /{resource}
pub async fn create(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(resource): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let payload: Value = parse_json(&body)?;
    let outcome = state.services.resource_service.create(&ctx, &resource, payload).await?;
    Ok(outcome_response(outcome))
}

/// GET /{resource}/{id}
pub async fn get_item(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((resource, id)): Path<(String, String)>,
    Query(params): Query<ItemParams>,
    headers: HeaderMap,
) -> Result<Response> {
    let document = state
        .services
        .resource_service
        .get(
            &ctx,
            &resource,
            &id,
            params.projection.as_deref(),
            header(&headers, ACCEPT_LANGUAGE),
        )
        .await?;
    Ok(document_response(StatusCode::OK, document))
}

/// PATCH /{resource}/{id}
pub async fn patch(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    update(state, ctx, resource, id, headers, body, false).await
}

/// PUT /{resource}/{id}
pub async fn put(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    update(state, ctx, resource, id, headers, body, true).await
}

async fn update(
    state: AppState,
    ctx: AuthContext,
    resource: String,
    id: String,
    headers: HeaderMap,
    body: Bytes,
    replace: bool,
) -> Result<Response> {
    let payload: Value = parse_json(&body)?;
    let outcome = state
        .services
        .resource_service
        .update(&ctx, &resource, &id, payload, header(&headers, IF_MATCH), replace)
        .await?;
    Ok(match outcome {
        Outcome::Applied(Some(document)) => document_response(StatusCode::OK, document),
        other => outcome_response(other),
    })
}

/// DELETE /{resource}/{id}
pub async fn delete(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path((resource, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let outcome = state
        .services
        .resource_service
        .delete(&ctx, &resource, &id, header(&headers, IF_MATCH))
        .await?;
    Ok(outcome_response(outcome))
}

/// GET /users/{id}/permissions
pub async fn user_permissions(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let permissions = state.services.resource_service.user_permissions(&ctx, &id).await?;
    Ok(Json(permissions))
}
