//! Mail forward models

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Forward {
    pub id: i64,
    pub address: String,
    pub owner_id: i64,
    pub is_public: bool,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

