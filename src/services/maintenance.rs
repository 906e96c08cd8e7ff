//! Background maintenance
//!
//! A tokio interval loop that warns members about role grants running out
//! and purges timed out sessions and expired confirmation tokens.

use std::collections::HashMap;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::settings::Settings;
use crate::database::DatabaseService;
use crate::services::notification::{NotificationService, TEMPLATE_PERMISSION_EXPIRY};
use crate::utils::errors::Result;

/// What one maintenance run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub warnings_sent: usize,
    pub sessions_purged: u64,
    pub confirmations_purged: u64,
}

#[derive(Clone)]
pub struct MaintenanceService {
    db: DatabaseService,
    notifications: NotificationService,
    interval: StdDuration,
    warning_period: Duration,
    session_timeout: Duration,
}

impl MaintenanceService {
    pub fn new(db: DatabaseService, notifications: NotificationService, settings: &Settings) -> Self {
        Self {
            db,
            notifications,
            interval: StdDuration::from_secs(settings.maintenance.interval_seconds),
            warning_period: Duration::days(settings.maintenance.permission_warning_days),
            session_timeout: Duration::days(settings.auth.session_timeout_days),
        }
    }

    /// Run until `shutdown` flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        info!(interval_seconds = self.interval.as_secs(), "Maintenance task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(report) => info!(?report, "Maintenance run finished"),
                        Err(e) => error!(error = %e, "Maintenance run failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Maintenance task stopped");
                        return;
                    }
                }
            }
        }
    }

    pub async fn run_once(&self) -> Result<MaintenanceReport> {
        let now = Utc::now();

        let warnings_sent = self.warn_expiring_permissions().await?;
        let sessions_purged = self
            .db
            .sessions
            .delete_created_before(now - self.session_timeout)
            .await?;
        let confirmations_purged = self.db.confirmations.delete_expired(now).await?;

        Ok(MaintenanceReport {
            warnings_sent,
            sessions_purged,
            confirmations_purged,
        })
    }

    /// Mail every holder of a grant expiring soon, once per grant
    async fn warn_expiring_permissions(&self) -> Result<usize> {
        let now = Utc::now();
        let expiring = self
            .db
            .permissions
            .expiring_before(now, now + self.warning_period)
            .await?;

        let mut sent = 0;
        for grant in expiring {
            let mut parameters = HashMap::new();
            parameters.insert("firstname".to_string(), grant.firstname.clone());
            parameters.insert("role".to_string(), grant.role.clone());
            parameters.insert("expiry_date".to_string(), grant.expiry_date.format("%d.%m.%Y").to_string());

            match self
                .notifications
                .send_template(&grant.email, TEMPLATE_PERMISSION_EXPIRY, &parameters)
                .await
            {
                Ok(()) => {
                    self.db.permissions.mark_warned(grant.id).await?;
                    sent += 1;
                }
                Err(e) => {
                    warn!(permission_id = grant.id, user_id = grant.user_id, error = %e, "Expiry warning not sent");
                }
            }
        }
        Ok(sent)
    }
}
