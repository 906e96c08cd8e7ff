//! Application settings management
//!
//! This module defines the configuration structure and provides methods
//! for loading settings from TOML files and environment variables.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role name -> resource name -> permitted verbs
pub type RoleTable = BTreeMap<String, BTreeMap<String, Vec<String>>>;

/// Main application configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub confirm: ConfirmConfig,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    pub forwards: ForwardsConfig,
    pub i18n: I18nConfig,
    pub logging: LoggingConfig,
    pub maintenance: MaintenanceConfig,
    pub roles: RoleTable,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Users with admin access to every resource
    pub admin_user_ids: Vec<i64>,
    pub session_timeout_days: i64,
    pub login_attempts_per_minute: u32,
}

/// Confirmation token configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfirmConfig {
    pub token_ttl_hours: i64,
}

/// Outgoing mail configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MailConfig {
    /// `log` or `http`
    pub backend: String,
    pub relay_url: Option<String>,
    pub from: String,
    pub admin_mail: String,
    pub timeout_seconds: u64,
}

/// Media storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub media_dir: String,
    pub max_upload_bytes: usize,
}

/// Mail forwarder sync configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForwardsConfig {
    pub enabled: bool,
    pub directory: String,
}

/// Internationalization configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct I18nConfig {
    pub default_language: String,
    pub supported_languages: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Directory for the rolling log file, stdout only when empty
    pub file_path: String,
    pub json: bool,
}

/// Background maintenance configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
    pub permission_warning_days: i64,
}

impl Settings {
    /// Load settings from configuration file and environment variables
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("MEMBERHUB")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_user_ids")
                    .with_list_parse_key("server.allowed_origins")
                    .with_list_parse_key("i18n.supported_languages"),
            )
            .build()?;

        settings.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), crate::utils::errors::MemberHubError> {
        super::validation::validate_settings(self)
    }

    /// Socket address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                allowed_origins: vec![],
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/memberhub".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            auth: AuthConfig {
                admin_user_ids: vec![],
                session_timeout_days: 365,
                login_attempts_per_minute: 10,
            },
            confirm: ConfirmConfig {
                token_ttl_hours: 48,
            },
            mail: MailConfig {
                backend: "log".to_string(),
                relay_url: None,
                from: "noreply@memberhub.local".to_string(),
                admin_mail: "admin@memberhub.local".to_string(),
                timeout_seconds: 10,
            },
            storage: StorageConfig {
                media_dir: "./media".to_string(),
                max_upload_bytes: 20 * 1024 * 1024,
            },
            forwards: ForwardsConfig {
                enabled: false,
                directory: "./forwards".to_string(),
            },
            i18n: I18nConfig {
                default_language: "de".to_string(),
                supported_languages: vec!["de".to_string(), "en".to_string()],
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: String::new(),
                json: false,
            },
            maintenance: MaintenanceConfig {
                interval_seconds: 3600,
                permission_warning_days: 14,
            },
            roles: default_roles(),
        }
    }
}

const ALL_VERBS: &[&str] = &["GET", "POST", "PATCH", "PUT", "DELETE"];

fn grant(resources: &[&str], verbs: &[&str]) -> BTreeMap<String, Vec<String>> {
    resources
        .iter()
        .map(|r| (r.to_string(), verbs.iter().map(|v| v.to_string()).collect()))
        .collect()
}

/// Roles shipped with the application
pub fn default_roles() -> RoleTable {
    let mut roles = RoleTable::new();

    let mut vorstand = grant(
        &[
            "users", "groups", "groupmemberships", "permissions", "forwards", "forwardusers",
            "forwardaddresses", "events", "eventsignups", "files", "studydocuments", "joboffers",
            "translations",
        ],
        ALL_VERBS,
    );
    vorstand.extend(grant(&["sessions"], &["GET", "DELETE"]));
    roles.insert("vorstand".to_string(), vorstand);

    roles.insert(
        "read-everything".to_string(),
        grant(
            &[
                "users", "groups", "groupmemberships", "permissions", "forwards", "forwardusers",
                "forwardaddresses", "sessions", "events", "eventsignups", "files", "studydocuments",
                "joboffers", "translations",
            ],
            &["GET"],
        ),
    );
    roles.insert(
        "event-admin".to_string(),
        grant(&["events", "eventsignups", "translations"], ALL_VERBS),
    );
    roles.insert(
        "job-admin".to_string(),
        grant(&["files", "joboffers", "translations"], ALL_VERBS),
    );
    roles.insert(
        "mail-admin".to_string(),
        grant(&["forwards", "forwardusers", "forwardaddresses"], ALL_VERBS),
    );
    roles.insert(
        "studydocs-admin".to_string(),
        grant(&["files", "studydocuments"], ALL_VERBS),
    );

    roles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roles() {
        let roles = default_roles();
        assert_eq!(roles.len(), 6);
        assert_eq!(roles["event-admin"]["eventsignups"].len(), 5);
        assert_eq!(roles["read-everything"]["users"], vec!["GET".to_string()]);
        assert!(!roles["vorstand"]["sessions"].contains(&"POST".to_string()));
    }

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.bind_address(), "0.0.0.0:5000");
    }
}
