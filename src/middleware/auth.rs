//! Authentication middleware
//!
//! Resolves the `Authorization` header into an [`AuthContext`] stored in the
//! request extensions. Requests without a header continue anonymously;
//! unknown or timed out tokens are rejected.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::services::auth::parse_token;
use crate::state::AppState;
use crate::utils::errors::MemberHubError;

pub async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let header = match request.headers().get(AUTHORIZATION).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value.to_string()),
        Some(Err(_)) => {
            return MemberHubError::Authentication("Invalid token".to_string()).into_response();
        }
    };

    let token = match header.as_deref().map(parse_token) {
        None => None,
        Some(Some(token)) => Some(token),
        Some(None) => {
            return MemberHubError::Authentication("Unsupported authorization scheme".to_string())
                .into_response();
        }
    };

    match state.services.auth_service.authenticate(token).await {
        Ok(ctx) => {
            debug!(user_id = ?ctx.user_id(), is_root = ctx.is_root, "Request authenticated");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
