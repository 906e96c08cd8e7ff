//! Event signup eligibility
//!
//! The checks are plain functions over an event, the current signup count
//! and the clock. [`SignupService`] runs them against a locked event row so
//! the capacity check and the insert see the same count.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::PgConnection;

use crate::database::{DatabaseService, EventRepository, ResourceRepository};
use crate::models::{Event, EventRules, NewSignup};
use crate::schema::{lookup, parse_extra_schema, validate_extra_data};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::logging::log_signup;

/// Capacity and registration window of an event
pub fn check_registration(event: &Event, signup_count: i64, now: DateTime<Utc>) -> Result<()> {
    if !event.offers_signup() {
        return Err(MemberHubError::Unprocessable(format!(
            "Event {} does not offer a signup.",
            event.id
        )));
    }

    if event.spots > 0 && signup_count >= event.spots {
        return Err(MemberHubError::Unprocessable(format!(
            "There are no spots left for event {}",
            event.id
        )));
    }

    if event.time_register_start.map_or(false, |start| now < start) {
        return Err(MemberHubError::Unprocessable(format!(
            "The signup for event {} is not open yet.",
            event.id
        )));
    }
    if event.time_register_end.map_or(false, |end| now > end) {
        return Err(MemberHubError::Unprocessable(format!(
            "The signup for event {} is closed.",
            event.id
        )));
    }

    Ok(())
}

/// Who may sign up and which extra data they must provide.
///
/// Registered signups without an email get `user_email`.
pub fn check_signup(event: &Event, signup: &mut NewSignup, user_email: Option<&str>) -> Result<()> {
    if signup.is_anonymous() {
        if !event.is_public {
            return Err(MemberHubError::Unprocessable(
                "The event is only open for registered users.".to_string(),
            ));
        }
        if signup.email.is_none() {
            return Err(MemberHubError::Unprocessable(
                "You need to provide an email-address or a valid user_id".to_string(),
            ));
        }
    } else if signup.email.is_none() {
        signup.email = user_email.map(str::to_string);
    }

    check_extra_data(event, signup.extra_data.as_ref())
}

/// `extra_data` against the fields the event declares
pub fn check_extra_data(event: &Event, extra_data: Option<&Value>) -> Result<()> {
    let declared = match event.additional_fields.as_ref().filter(|v| !v.is_null()) {
        Some(declared) => declared,
        None => return Ok(()),
    };

    let fields = parse_extra_schema(declared).map_err(|message| {
        MemberHubError::Unprocessable(format!("event {} has invalid additional_fields: {}", event.id, message))
    })?;

    match extra_data.filter(|v| !v.is_null()) {
        Some(data) => validate_extra_data(&fields, data).map_err(MemberHubError::Validation),
        None => Err(MemberHubError::Unprocessable(format!(
            "event {} requires extra data: {}",
            event.id, declared
        ))),
    }
}

/// Scheduling rules of an event document
pub fn check_event(rules: &EventRules) -> Result<()> {
    if rules.spots.map_or(false, |spots| spots >= 0) {
        match (rules.time_register_start, rules.time_register_end) {
            (Some(start), Some(end)) if end <= start => {
                return Err(MemberHubError::Unprocessable(
                    "time_register_start needs to be before time_register_end".to_string(),
                ));
            }
            (Some(_), Some(_)) => {}
            _ => {
                return Err(MemberHubError::Unprocessable(
                    "You need to set time_register_start and time_register_end".to_string(),
                ));
            }
        }
    }

    if let (Some(start), Some(end)) = (rules.time_start, rules.time_end) {
        if start > end {
            return Err(MemberHubError::Unprocessable(
                "time_end needs to be after time_start".to_string(),
            ));
        }
    }

    if rules.price.map_or(false, |price| price < Decimal::ZERO) {
        return Err(MemberHubError::Unprocessable(
            "price needs to be positive or zero".to_string(),
        ));
    }

    if let Some(fields) = rules.additional_fields.as_ref().filter(|v| !v.is_null()) {
        parse_extra_schema(fields).map_err(|message| {
            MemberHubError::Unprocessable(format!("exception for additional_fields: {}", message))
        })?;
    }

    Ok(())
}

/// Event rules of a stored document with an update applied on top
pub fn merged_rules(original: Option<&Value>, updates: &Map<String, Value>) -> Result<EventRules> {
    let mut merged = original
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (key, value) in updates {
        merged.insert(key.clone(), value.clone());
    }
    serde_json::from_value(Value::Object(merged))
        .map_err(|e| MemberHubError::Unprocessable(format!("invalid event: {}", e)))
}

/// Signup service for registrations
#[derive(Clone)]
pub struct SignupService {
    db: DatabaseService,
}

impl SignupService {
    pub fn new(db: DatabaseService) -> Self {
        Self { db }
    }

    /// Run every check for a signup without storing it
    pub async fn precheck(&self, signup: &mut NewSignup, user_email: Option<&str>) -> Result<Event> {
        let mut tx = self.db.begin().await?;
        let event = Self::evaluate(&mut tx, signup, user_email).await?;
        tx.rollback().await?;
        Ok(event)
    }

    /// Check and store a signup on the caller's connection.
    ///
    /// The event row stays locked until the caller's transaction ends.
    pub async fn create(conn: &mut PgConnection, mut signup: NewSignup, user_email: Option<&str>) -> Result<Value> {
        Self::evaluate(&mut *conn, &mut signup, user_email).await?;

        let schema = lookup("eventsignups")?;
        let payload = match serde_json::to_value(&signup)? {
            Value::Object(mut map) => {
                map.retain(|_, v| !v.is_null());
                map
            }
            _ => Map::new(),
        };
        let document = ResourceRepository::insert(&mut *conn, schema, &payload).await?;

        log_signup(signup.event_id, signup.user_id, true, None);
        Ok(document)
    }

    async fn evaluate(conn: &mut PgConnection, signup: &mut NewSignup, user_email: Option<&str>) -> Result<Event> {
        let event = EventRepository::find(&mut *conn, signup.event_id, true)
            .await?
            .ok_or_else(|| {
                MemberHubError::issue("event_id", format!("value '{}' must exist in resource 'events'", signup.event_id))
            })?;

        let result = Self::evaluate_event(conn, &event, signup, user_email).await;
        if let Err(e) = &result {
            log_signup(event.id, signup.user_id, false, Some(&e.to_string()));
        }
        result.map(|_| event)
    }

    async fn evaluate_event(
        conn: &mut PgConnection,
        event: &Event,
        signup: &mut NewSignup,
        user_email: Option<&str>,
    ) -> Result<()> {
        let count = EventRepository::signup_count(&mut *conn, event.id).await?;
        check_registration(event, count, Utc::now())?;
        check_signup(event, signup, user_email)?;

        if EventRepository::is_signed_up(&mut *conn, event.id, signup.user_id, signup.email.as_deref()).await? {
            return Err(MemberHubError::Unprocessable(
                "You are already signed up for this event, try to use PATCH".to_string(),
            ));
        }
        Ok(())
    }
}
