//! Logging configuration and setup
//!
//! This module provides logging initialization and structured logging utilities
//! for the MemberHub application.

use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};
use crate::config::LoggingConfig;
use crate::utils::errors::{MemberHubError, Result};

/// Initialize logging based on configuration.
///
/// The returned guard must be held for as long as the file writer is needed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.level)
        .map_err(|e| MemberHubError::Config(format!("Invalid log filter: {}", e)))?;

    let stdout_layer = if config.json {
        tracing_subscriber::fmt::layer().json().with_writer(std::io::stdout).boxed()
    } else {
        tracing_subscriber::fmt::layer().with_writer(std::io::stdout).boxed()
    };

    let (file_layer, guard) = if config.file_path.is_empty() {
        (None, None)
    } else {
        let file_appender = tracing_appender::rolling::daily(&config.file_path, "memberhub.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(non_blocking);
        (Some(layer), Some(guard))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| MemberHubError::Config(format!("Logging already initialized: {}", e)))?;

    info!("Logging initialized with level: {}", config.level);
    Ok(guard)
}

/// Log user actions with structured data
pub fn log_user_action(user_id: Option<i64>, action: &str, details: Option<&str>) {
    info!(
        user_id = user_id,
        action = action,
        details = details,
        "User action performed"
    );
}

/// Log admin actions
pub fn log_admin_action(admin_id: i64, action: &str, target: Option<&str>, details: Option<&str>) {
    warn!(
        admin_id = admin_id,
        action = action,
        target = target,
        details = details,
        "Admin action performed"
    );
}

/// Log event signup decisions
pub fn log_signup(event_id: i64, user_id: Option<i64>, accepted: bool, reason: Option<&str>) {
    if accepted {
        info!(event_id = event_id, user_id = user_id, "Signup accepted");
    } else {
        debug!(event_id = event_id, user_id = user_id, reason = reason, "Signup rejected");
    }
}

/// Log confirmation workflow steps
pub fn log_confirmation(resource: &str, action: &str, stage: &str) {
    info!(
        resource = resource,
        action = action,
        stage = stage,
        "Confirmation workflow step"
    );
}

/// Log database operations
pub fn log_database_operation(operation: &str, table: &str, duration_ms: u64) {
    debug!(
        operation = operation,
        table = table,
        duration_ms = duration_ms,
        "Database operation completed"
    );
}
