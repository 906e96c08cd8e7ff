//! Error handling for MemberHub
//!
//! This module defines the main error type used throughout the application
//! and how every variant is rendered as an HTTP response.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Field name -> human readable problem
pub type Issues = BTreeMap<String, String>;

/// Postgres SQLSTATE for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

/// Postgres SQLSTATE for foreign key violations
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Postgres SQLSTATE for not-null violations
const NOT_NULL_VIOLATION: &str = "23502";

/// Main error type for MemberHub
#[derive(Error, Debug)]
pub enum MemberHubError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("Validation failed")]
    Validation(Issues),

    #[error("{0}")]
    Unprocessable(String),

    #[error("Method {method} not allowed on {resource}")]
    MethodNotAllowed { method: String, resource: String },

    #[error("Client and server etags don't match")]
    PreconditionFailed,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Mail delivery error: {0}")]
    Mail(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for MemberHub operations
pub type Result<T> = std::result::Result<T, MemberHubError>;

impl MemberHubError {
    pub fn not_found(resource: &str, id: impl ToString) -> Self {
        MemberHubError::NotFound {
            resource: resource.to_string(),
            id: id.to_string(),
        }
    }

    /// Single-field validation failure
    pub fn issue(field: &str, message: impl Into<String>) -> Self {
        let mut issues = Issues::new();
        issues.insert(field.to_string(), message.into());
        MemberHubError::Validation(issues)
    }

    /// HTTP status code the error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            MemberHubError::Database(sqlx::Error::RowNotFound) => StatusCode::NOT_FOUND,
            MemberHubError::Database(e) if is_constraint_violation(e) => StatusCode::UNPROCESSABLE_ENTITY,
            MemberHubError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            MemberHubError::Authentication(_) => StatusCode::UNAUTHORIZED,
            MemberHubError::NotFound { .. } => StatusCode::NOT_FOUND,
            MemberHubError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MemberHubError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MemberHubError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            MemberHubError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            MemberHubError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            MemberHubError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MemberHubError::Database(sqlx::Error::RowNotFound) => ErrorSeverity::Info,
            MemberHubError::Database(e) if is_constraint_violation(e) => ErrorSeverity::Info,
            MemberHubError::Database(_) => ErrorSeverity::Critical,
            MemberHubError::Migration(_) => ErrorSeverity::Critical,
            MemberHubError::Config(_) => ErrorSeverity::Critical,
            MemberHubError::ConfigLoad(_) => ErrorSeverity::Critical,
            MemberHubError::PermissionDenied(_) => ErrorSeverity::Warning,
            MemberHubError::Authentication(_) => ErrorSeverity::Warning,
            MemberHubError::RateLimitExceeded => ErrorSeverity::Warning,
            MemberHubError::NotFound { .. } => ErrorSeverity::Info,
            MemberHubError::Validation(_) => ErrorSeverity::Info,
            MemberHubError::Unprocessable(_) => ErrorSeverity::Info,
            MemberHubError::MethodNotAllowed { .. } => ErrorSeverity::Info,
            MemberHubError::PreconditionFailed => ErrorSeverity::Info,
            MemberHubError::InvalidInput(_) => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// Message shown to API clients. Internal failures are not disclosed.
    fn public_message(&self) -> String {
        match self {
            MemberHubError::Database(sqlx::Error::RowNotFound) => "Item not found".to_string(),
            MemberHubError::Database(e) if is_unique_violation(e) => "value already exists".to_string(),
            MemberHubError::Database(e) if has_code(e, NOT_NULL_VIOLATION) => "value must not be null".to_string(),
            MemberHubError::Database(e) if is_constraint_violation(e) => {
                "value references a non-existing item".to_string()
            }
            e if e.status_code() == StatusCode::INTERNAL_SERVER_ERROR => {
                "An internal error occurred".to_string()
            }
            e => e.to_string(),
        }
    }
}

fn has_code(error: &sqlx::Error, code: &str) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.code().as_deref() == Some(code))
}

/// Whether the error is a unique constraint violation
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    has_code(error, UNIQUE_VIOLATION)
}

fn is_constraint_violation(error: &sqlx::Error) -> bool {
    [UNIQUE_VIOLATION, FOREIGN_KEY_VIOLATION, NOT_NULL_VIOLATION]
        .iter()
        .any(|code| has_code(error, code))
}

impl IntoResponse for MemberHubError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self.severity() {
            ErrorSeverity::Critical | ErrorSeverity::Error => {
                error!(error = %self, severity = %self.severity(), "Request failed")
            }
            ErrorSeverity::Warning => warn!(error = %self, "Request rejected"),
            ErrorSeverity::Info => debug!(error = %self, "Request rejected"),
        }

        let mut body = json!({
            "_status": "ERR",
            "_error": {
                "code": status.as_u16(),
                "message": self.public_message(),
            }
        });
        if let MemberHubError::Validation(issues) = &self {
            body["_issues"] = json!(issues);
        }

        (status, Json(body)).into_response()
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(MemberHubError::PermissionDenied("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(MemberHubError::Authentication("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(MemberHubError::Unprocessable("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(MemberHubError::issue("email", "bad").status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(MemberHubError::not_found("events", 3).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(MemberHubError::Database(sqlx::Error::RowNotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(MemberHubError::Config("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_messages_are_hidden() {
        let err = MemberHubError::Mail("smtp relay password wrong".into());
        assert_eq!(err.public_message(), "An internal error occurred");

        let err = MemberHubError::Unprocessable("The signup for event 4 is closed.".into());
        assert_eq!(err.public_message(), "The signup for event 4 is closed.");
    }

    #[test]
    fn test_severity() {
        assert_eq!(MemberHubError::RateLimitExceeded.severity(), ErrorSeverity::Warning);
        assert_eq!(MemberHubError::Config("x".into()).severity(), ErrorSeverity::Critical);
        assert_eq!(MemberHubError::issue("a", "b").severity(), ErrorSeverity::Info);
    }
}
