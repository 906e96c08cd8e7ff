//! Configuration validation module
//!
//! This module provides validation functions for application configuration
//! to ensure all required settings are properly configured.

use crate::utils::errors::{MemberHubError, Result};
use super::Settings;

const VERBS: &[&str] = &["GET", "POST", "PATCH", "PUT", "DELETE"];

/// Validate all configuration settings
pub fn validate_settings(settings: &Settings) -> Result<()> {
    validate_server_config(&settings.server)?;
    validate_database_config(&settings.database)?;
    validate_auth_config(&settings.auth)?;
    validate_mail_config(&settings.mail)?;
    validate_storage_config(&settings.storage)?;
    validate_i18n_config(&settings.i18n)?;
    validate_logging_config(&settings.logging)?;
    validate_roles(&settings.roles)?;

    if settings.confirm.token_ttl_hours <= 0 {
        return Err(MemberHubError::Config(
            "Confirmation token TTL must be greater than 0".to_string()
        ));
    }

    if settings.forwards.enabled && settings.forwards.directory.is_empty() {
        return Err(MemberHubError::Config(
            "Forward directory is required when forward sync is enabled".to_string()
        ));
    }

    if settings.maintenance.interval_seconds == 0 {
        return Err(MemberHubError::Config(
            "Maintenance interval must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate server configuration
fn validate_server_config(config: &super::ServerConfig) -> Result<()> {
    if config.host.is_empty() {
        return Err(MemberHubError::Config(
            "Server host is required".to_string()
        ));
    }

    if config.port == 0 {
        return Err(MemberHubError::Config(
            "Server port must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate database configuration
fn validate_database_config(config: &super::DatabaseConfig) -> Result<()> {
    if config.url.is_empty() {
        return Err(MemberHubError::Config(
            "Database URL is required".to_string()
        ));
    }

    if config.max_connections == 0 {
        return Err(MemberHubError::Config(
            "Max connections must be greater than 0".to_string()
        ));
    }

    if config.min_connections > config.max_connections {
        return Err(MemberHubError::Config(
            "Min connections cannot be greater than max connections".to_string()
        ));
    }

    Ok(())
}

/// Validate authentication configuration
fn validate_auth_config(config: &super::AuthConfig) -> Result<()> {
    if config.session_timeout_days <= 0 {
        return Err(MemberHubError::Config(
            "Session timeout must be greater than 0".to_string()
        ));
    }

    if config.login_attempts_per_minute == 0 {
        return Err(MemberHubError::Config(
            "Login attempts per minute must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate mail configuration
fn validate_mail_config(config: &super::MailConfig) -> Result<()> {
    match config.backend.as_str() {
        "log" => {}
        "http" => {
            let relay_url = config.relay_url.as_deref().unwrap_or_default();
            if relay_url.is_empty() {
                return Err(MemberHubError::Config(
                    "Mail relay URL is required for the http backend".to_string()
                ));
            }
            url::Url::parse(relay_url)?;
        }
        other => {
            return Err(MemberHubError::Config(
                format!("Invalid mail backend: {}. Valid backends: [\"log\", \"http\"]", other)
            ));
        }
    }

    if !config.from.contains('@') {
        return Err(MemberHubError::Config(
            "Mail sender address is invalid".to_string()
        ));
    }

    Ok(())
}

/// Validate storage configuration
fn validate_storage_config(config: &super::StorageConfig) -> Result<()> {
    if config.media_dir.is_empty() {
        return Err(MemberHubError::Config(
            "Media directory is required".to_string()
        ));
    }

    if config.max_upload_bytes == 0 {
        return Err(MemberHubError::Config(
            "Max upload size must be greater than 0".to_string()
        ));
    }

    Ok(())
}

/// Validate internationalization configuration
fn validate_i18n_config(config: &super::I18nConfig) -> Result<()> {
    if config.default_language.is_empty() {
        return Err(MemberHubError::Config(
            "Default language is required".to_string()
        ));
    }

    if config.supported_languages.is_empty() {
        return Err(MemberHubError::Config(
            "At least one supported language is required".to_string()
        ));
    }

    if !config.supported_languages.contains(&config.default_language) {
        return Err(MemberHubError::Config(
            "Default language must be in supported languages list".to_string()
        ));
    }

    Ok(())
}

/// Validate logging configuration
fn validate_logging_config(config: &super::LoggingConfig) -> Result<()> {
    if config.level.is_empty() {
        return Err(MemberHubError::Config(
            "Log level is required".to_string()
        ));
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.level.as_str()) {
        return Err(MemberHubError::Config(
            format!("Invalid log level: {}. Valid levels: {:?}", config.level, valid_levels)
        ));
    }

    Ok(())
}

/// Every role must name known verbs only
fn validate_roles(roles: &super::RoleTable) -> Result<()> {
    for (role, resources) in roles {
        for (resource, verbs) in resources {
            if let Some(verb) = verbs.iter().find(|v| !VERBS.contains(&v.as_str())) {
                return Err(MemberHubError::Config(
                    format!("Role {} grants unknown verb {} on {}", role, verb, resource)
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_log_level() {
        let mut settings = Settings::default();
        settings.logging.level = "loud".to_string();
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_http_mail_requires_relay() {
        let mut settings = Settings::default();
        settings.mail.backend = "http".to_string();
        assert!(validate_settings(&settings).is_err());

        settings.mail.relay_url = Some("http://localhost:8025/send".to_string());
        assert!(validate_settings(&settings).is_ok());
    }

    #[test]
    fn test_rejects_unknown_verb_in_role() {
        let mut settings = Settings::default();
        settings
            .roles
            .get_mut("event-admin")
            .unwrap()
            .insert("events".to_string(), vec!["FETCH".to_string()]);
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_default_language_must_be_supported() {
        let mut settings = Settings::default();
        settings.i18n.default_language = "fr".to_string();
        assert!(validate_settings(&settings).is_err());
    }
}
