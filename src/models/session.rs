//! Session model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, timeout_days: i64, now: DateTime<Utc>) -> bool {
        self.created_at + chrono::Duration::days(timeout_days) < now
    }
}
