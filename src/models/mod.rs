//! Data models module
//!
//! Typed rows for the tables the business rules work on. Everything else is
//! handled as JSON documents described by the resource schema registry.

pub mod user;
pub mod session;
pub mod event;
pub mod permission;
pub mod forward;
pub mod file;
pub mod confirmation;
pub mod translation;

// Re-export commonly used models
pub use user::{User, LoginRequest, ADMIN_ONLY_USER_FIELDS};
pub use session::Session;
pub use event::{Event, EventRules, NewSignup, NO_SIGNUP, UNLIMITED_SPOTS};
pub use permission::{Permission, ExpiringPermission};
pub use forward::Forward;
pub use file::{StoredFile, CreateFileRequest};
pub use confirmation::{PendingConfirmation, ConfirmAction, CreateConfirmationRequest, ConfirmRequest};
pub use translation::Translation;
