//! HTTP handlers module
//!
//! This module contains the REST handlers organized by concern:
//! - Resource handlers for the generic collection and item endpoints
//! - Session, confirmation and file handlers for the special endpoints
//! - System handlers for health, schema and roles

pub mod confirms;
pub mod files;
pub mod resources;
pub mod sessions;
pub mod system;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE, ETAG, IF_MATCH},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use axum::body::Bytes;
use serde::de::DeserializeOwned;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::middleware::{auth_middleware, trace_layer};
use crate::state::AppState;
use crate::utils::errors::{MemberHubError, Result};

/// Room for multipart framing on top of the upload itself
const BODY_LIMIT_SLACK: usize = 64 * 1024;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state.settings.storage.max_upload_bytes + BODY_LIMIT_SLACK;
    let cors = cors_layer(&state.settings.server.allowed_origins);

    Router::new()
        .route("/health", get(system::health))
        .route("/docs", get(system::docs))
        .route("/roles", get(system::roles))
        .route("/confirms", post(confirms::confirm))
        .route("/sessions", get(sessions::list).post(sessions::login))
        .route("/files", get(files::list).post(files::upload))
        .route("/storage/:name", get(files::download))
        .route("/users/:id/permissions", get(resources::user_permissions))
        .route("/:resource", get(resources::list).post(resources::create))
        .route(
            "/:resource/:id",
            get(resources::get_item)
                .patch(resources::patch)
                .put(resources::put)
                .delete(resources::delete),
        )
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(trace_layer())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| match HeaderValue::from_str(o) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, IF_MATCH, ACCEPT_LANGUAGE])
        .expose_headers([ETAG])
}

/// Parse a request body as JSON
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    if body.is_empty() {
        return Err(MemberHubError::InvalidInput("Request body is empty".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| MemberHubError::InvalidInput(format!("Invalid JSON: {}", e)))
}
