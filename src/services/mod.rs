//! Services module
//!
//! This module contains business logic services

pub mod auth;
pub mod authorization;
pub mod confirm;
pub mod forwards;
pub mod maintenance;
pub mod media;
pub mod notification;
pub mod resources;
pub mod signup;

// Re-export commonly used services
pub use auth::{AuthContext, AuthService, Caller};
pub use authorization::{Access, PermissionMap};
pub use confirm::{ConfirmService, Outcome, CONFIRMATION_MESSAGE};
pub use forwards::{FileForwardSync, ForwardService, ForwardSync, NoopForwardSync};
pub use maintenance::{MaintenanceReport, MaintenanceService};
pub use media::MediaService;
pub use notification::{LogMailer, Mailer, NotificationService};
pub use resources::{Page, ResourceService};
pub use signup::SignupService;

use std::sync::Arc;

use crate::config::settings::Settings;
use crate::database::DatabaseService;
use crate::i18n::I18n;
use crate::utils::errors::Result;

/// Service factory for creating and managing all services
#[derive(Clone)]
pub struct ServiceFactory {
    pub auth_service: AuthService,
    pub notification_service: NotificationService,
    pub forward_service: ForwardService,
    pub media_service: MediaService,
    pub confirm_service: ConfirmService,
    pub resource_service: ResourceService,
    pub maintenance_service: MaintenanceService,
}

impl ServiceFactory {
    /// Create a new ServiceFactory with the mail backend from the settings
    pub fn new(settings: Settings, db: DatabaseService) -> Result<Self> {
        let mailer = notification::mailer_from_config(&settings.mail)?;
        Ok(Self::with_mailer(settings, db, mailer))
    }

    /// Create a new ServiceFactory sending mail through `mailer`
    pub fn with_mailer(settings: Settings, db: DatabaseService, mailer: Arc<dyn Mailer>) -> Self {
        let auth_service = AuthService::new(
            db.users.clone(),
            db.sessions.clone(),
            db.permissions.clone(),
            settings.clone(),
        );
        let notification_service = NotificationService::new(mailer, settings.mail.clone());
        let forward_service = ForwardService::from_config(db.forwards.clone(), &settings.forwards);
        let media_service = MediaService::new(&settings.storage, db.files.clone());
        let confirm_service = ConfirmService::new(
            db.clone(),
            notification_service.clone(),
            forward_service.clone(),
            settings.confirm.token_ttl_hours,
        );
        let resource_service = ResourceService::new(
            db.clone(),
            confirm_service.clone(),
            forward_service.clone(),
            media_service.clone(),
            I18n::new(&settings.i18n),
            settings.clone(),
        );
        let maintenance_service = MaintenanceService::new(db, notification_service.clone(), &settings);

        Self {
            auth_service,
            notification_service,
            forward_service,
            media_service,
            confirm_service,
            resource_service,
            maintenance_service,
        }
    }
}
