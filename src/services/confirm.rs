//! Confirmation workflow
//!
//! Changes requested without an account (guest signups and mailing list
//! subscriptions, their changes and their removal) are stored as pending
//! confirmations. The
//! token is mailed to the address concerned and the change is applied once
//! the token is posted to `/confirms`.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::database::{ConfirmationRepository, DatabaseService, ResourceRepository};
use crate::models::{ConfirmAction, CreateConfirmationRequest, NewSignup, PendingConfirmation};
use crate::schema::lookup;
use crate::services::forwards::ForwardService;
use crate::services::notification::{
    NotificationService, TEMPLATE_CONFIRM_CHANGE, TEMPLATE_CONFIRM_SIGNOFF, TEMPLATE_CONFIRM_SIGNUP,
    TEMPLATE_CONFIRM_SUBSCRIBE, TEMPLATE_CONFIRM_UNSUBSCRIBE,
};
use crate::services::signup::{check_extra_data, SignupService};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::helpers::{generate_token, is_valid_email};
use crate::utils::logging::log_confirmation;

pub const CONFIRMATION_MESSAGE: &str =
    "Please check your email and POST the token to /confirms to process your request";

/// Result of a write that may need confirmation
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Applied right away; the stored document, if any
    Applied(Option<Value>),
    /// Waiting for the token mailed to the address concerned
    Deferred(String),
}

/// A change to apply once confirmed
#[derive(Debug, Clone)]
pub struct DeferredChange {
    pub resource: String,
    pub action: ConfirmAction,
    pub payload: Value,
    pub target_id: Option<i64>,
    pub email: String,
    /// What the change is about, e.g. the event title
    pub subject: String,
}

fn template_for(resource: &str, action: ConfirmAction) -> &'static str {
    match (resource, action) {
        ("forwardaddresses", ConfirmAction::Insert) => TEMPLATE_CONFIRM_SUBSCRIBE,
        ("forwardaddresses", ConfirmAction::Delete) => TEMPLATE_CONFIRM_UNSUBSCRIBE,
        (_, ConfirmAction::Update | ConfirmAction::Replace) => TEMPLATE_CONFIRM_CHANGE,
        (_, ConfirmAction::Insert) => TEMPLATE_CONFIRM_SIGNUP,
        (_, ConfirmAction::Delete) => TEMPLATE_CONFIRM_SIGNOFF,
    }
}

/// Confirmation service for deferred changes
#[derive(Clone)]
pub struct ConfirmService {
    db: DatabaseService,
    notifications: NotificationService,
    forwards: ForwardService,
    token_ttl: Duration,
}

impl ConfirmService {
    pub fn new(
        db: DatabaseService,
        notifications: NotificationService,
        forwards: ForwardService,
        token_ttl_hours: i64,
    ) -> Self {
        Self {
            db,
            notifications,
            forwards,
            token_ttl: Duration::hours(token_ttl_hours),
        }
    }

    /// Store a change and mail its token
    pub async fn defer(&self, change: DeferredChange) -> Result<Outcome> {
        if !is_valid_email(&change.email) {
            return Err(MemberHubError::issue("email", "not a valid email address"));
        }

        let token = generate_token();
        let template = template_for(&change.resource, change.action);
        let pending = self
            .db
            .confirmations
            .create(
                &token,
                CreateConfirmationRequest {
                    resource: change.resource.clone(),
                    action: change.action,
                    payload: change.payload,
                    target_id: change.target_id,
                    email: change.email.clone(),
                    expires_at: Utc::now() + self.token_ttl,
                },
            )
            .await?;

        self.notifications
            .send_confirmation(&change.email, template, &change.subject, &token)
            .await?;

        log_confirmation(&pending.resource, &pending.action, "requested");
        Ok(Outcome::Deferred(CONFIRMATION_MESSAGE.to_string()))
    }

    /// Apply the change a token stands for.
    ///
    /// Signups are checked again, so a guest cannot take a spot that was
    /// filled in the meantime. Changes are applied to the row as it is now.
    pub async fn redeem(&self, token: &str) -> Result<Value> {
        let mut tx = self.db.begin().await?;

        let pending = ConfirmationRepository::lock_by_token(&mut tx, token.trim())
            .await?
            .ok_or_else(|| MemberHubError::not_found("confirmation", "token"))?;

        if pending.is_expired(Utc::now()) {
            log_confirmation(&pending.resource, &pending.action, "expired");
            return Err(MemberHubError::Unprocessable(
                "The token has expired, please repeat your request".to_string(),
            ));
        }

        let action = ConfirmAction::parse(&pending.action).ok_or_else(|| {
            MemberHubError::Unprocessable(format!("unknown confirmation action '{}'", pending.action))
        })?;
        let schema = lookup(&pending.resource)?;

        let mut previous = None;
        let result = match action {
            ConfirmAction::Insert if schema.name == "eventsignups" => {
                let signup: NewSignup = serde_json::from_value(pending.payload.clone())?;
                SignupService::create(&mut tx, signup, None).await?
            }
            ConfirmAction::Insert => {
                let payload = as_object(&pending)?;
                ResourceRepository::insert(&mut tx, schema, &payload).await?
            }
            ConfirmAction::Update | ConfirmAction::Replace => {
                let target_id = pending
                    .target_id
                    .ok_or_else(|| MemberHubError::Unprocessable("confirmation has no target".to_string()))?;
                let current = ResourceRepository::lock(&mut tx, schema, target_id)
                    .await?
                    .ok_or_else(|| MemberHubError::not_found(schema.name, target_id))?;
                let payload = as_object(&pending)?;

                if schema.name == "eventsignups" && payload.contains_key("extra_data") {
                    let event_id = current.get("event_id").and_then(Value::as_i64).unwrap_or_default();
                    if let Some(event) = self.db.events.find_by_id(event_id).await? {
                        check_extra_data(&event, payload.get("extra_data"))?;
                    }
                }

                let replace = action == ConfirmAction::Replace;
                let document = ResourceRepository::update(&mut tx, schema, target_id, &payload, replace).await?;
                previous = Some(current);
                document
            }
            ConfirmAction::Delete => {
                let target_id = pending
                    .target_id
                    .ok_or_else(|| MemberHubError::Unprocessable("confirmation has no target".to_string()))?;
                ResourceRepository::delete(&mut tx, schema, target_id).await?;
                json!({"_status": "OK", "_deleted": target_id})
            }
        };

        ConfirmationRepository::delete(&mut tx, pending.id).await?;
        tx.commit().await?;

        log_confirmation(&pending.resource, &pending.action, "applied");

        if schema.name == "forwardaddresses" {
            let mut forward_ids: Vec<i64> = [Some(&pending.payload), Some(&result), previous.as_ref()]
                .into_iter()
                .flatten()
                .filter_map(|d| d.get("forward_id").and_then(Value::as_i64))
                .collect();
            forward_ids.sort_unstable();
            forward_ids.dedup();
            for forward_id in forward_ids {
                self.forwards.resync_logged(forward_id).await;
            }
        }

        debug!(confirmation_id = pending.id, "Confirmation redeemed");
        Ok(result)
    }
}

fn as_object(pending: &PendingConfirmation) -> Result<Map<String, Value>> {
    pending
        .payload
        .as_object()
        .cloned()
        .ok_or_else(|| MemberHubError::Unprocessable("confirmation payload is not an object".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates() {
        assert_eq!(template_for("eventsignups", ConfirmAction::Insert), TEMPLATE_CONFIRM_SIGNUP);
        assert_eq!(template_for("eventsignups", ConfirmAction::Delete), TEMPLATE_CONFIRM_SIGNOFF);
        assert_eq!(template_for("forwardaddresses", ConfirmAction::Insert), TEMPLATE_CONFIRM_SUBSCRIBE);
        assert_eq!(template_for("forwardaddresses", ConfirmAction::Delete), TEMPLATE_CONFIRM_UNSUBSCRIBE);
        assert_eq!(template_for("eventsignups", ConfirmAction::Update), TEMPLATE_CONFIRM_CHANGE);
        assert_eq!(template_for("forwardaddresses", ConfirmAction::Replace), TEMPLATE_CONFIRM_CHANGE);
    }
}
