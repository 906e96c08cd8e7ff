//! MemberHub
//!
//! REST backend for the members of a student organization. This library
//! provides the resource registry, authorization, event signups, mailing
//! list forwards, file storage and the confirmation workflow for guests.

pub mod config;
pub mod database;
pub mod handlers;
pub mod i18n;
pub mod middleware;
pub mod models;
pub mod schema;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use utils::errors::{MemberHubError, Result};

// Re-export main components for easy access
pub use database::DatabaseService;
pub use handlers::router;
pub use i18n::I18n;
pub use services::ServiceFactory;
pub use state::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{}", NAME, VERSION)
}
