//! Role grant model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub user_id: i64,
    pub role: String,
    pub expiry_date: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub expiry_warned: bool,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date > now
    }
}

/// Grant about to expire, joined with the holder's contact data
#[derive(Debug, Clone, FromRow)]
pub struct ExpiringPermission {
    pub id: i64,
    pub role: String,
    pub expiry_date: DateTime<Utc>,
    pub user_id: i64,
    pub email: String,
    pub firstname: String,
}
