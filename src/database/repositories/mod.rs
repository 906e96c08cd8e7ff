//! Database repositories module
//!
//! This module contains all repository implementations for data access

pub mod resource;
pub mod user;
pub mod session;
pub mod event;
pub mod permission;
pub mod forward;
pub mod confirmation;
pub mod file;
pub mod translation;

// Re-export repositories
pub use resource::ResourceRepository;
pub use user::UserRepository;
pub use session::SessionRepository;
pub use event::EventRepository;
pub use permission::PermissionRepository;
pub use forward::ForwardRepository;
pub use confirmation::ConfirmationRepository;
pub use file::FileRepository;
pub use translation::TranslationRepository;
