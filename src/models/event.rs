//! Event and signup models

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

/// `spots` value of events that offer no signup
pub const NO_SIGNUP: i64 = -1;

/// `spots` value of events without a capacity limit
pub const UNLIMITED_SPOTS: i64 = 0;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub title: Option<String>,
    pub time_start: Option<DateTime<Utc>>,
    pub time_end: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub is_public: bool,
    pub price: Option<Decimal>,
    pub spots: i64,
    pub time_register_start: Option<DateTime<Utc>>,
    pub time_register_end: Option<DateTime<Utc>>,
    pub additional_fields: Option<serde_json::Value>,
    pub title_id: Option<Uuid>,
    pub description_id: Option<Uuid>,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn offers_signup(&self) -> bool {
        self.spots != NO_SIGNUP
    }

    pub fn display_title(&self) -> String {
        self.title.clone().unwrap_or_else(|| format!("event {}", self.id))
    }
}

/// Signup payload after validation against the resource schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSignup {
    pub event_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub extra_data: Option<serde_json::Value>,
}

impl NewSignup {
    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }
}

/// Scheduling and signup rules of an event, read from a (possibly
/// partial) event document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventRules {
    #[serde(default)]
    pub spots: Option<i64>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_register_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_register_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additional_fields: Option<serde_json::Value>,
}
