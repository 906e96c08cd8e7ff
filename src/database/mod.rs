//! Database module
//!
//! This module handles database connections and operations

pub mod connection;
pub mod query;
pub mod repositories;
pub mod service;

// Re-export commonly used database components
pub use connection::{create_pool, ping, run_migrations, DatabasePool};
pub use query::{ListParams, ListQuery, OwnerFilter, Projection};
pub use repositories::{
    ResourceRepository, UserRepository, SessionRepository, EventRepository, PermissionRepository,
    ForwardRepository, ConfirmationRepository, FileRepository, TranslationRepository,
};
pub use service::DatabaseService;
