//! Application context
//!
//! Shared state handed to every request handler.

use std::sync::Arc;

use crate::config::settings::Settings;
use crate::database::DatabaseService;
use crate::middleware::LoginRateLimiter;
use crate::services::ServiceFactory;

/// Application-wide context containing services and settings
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub database: DatabaseService,
    pub services: Arc<ServiceFactory>,
    pub login_limiter: LoginRateLimiter,
}

impl AppState {
    /// Create from ServiceFactory and DatabaseService
    pub fn from_factory(factory: ServiceFactory, database: DatabaseService, settings: Settings) -> Self {
        Self {
            login_limiter: LoginRateLimiter::new(settings.auth.login_attempts_per_minute),
            settings: Arc::new(settings),
            database,
            services: Arc::new(factory),
        }
    }
}
