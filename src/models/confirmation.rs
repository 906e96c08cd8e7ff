//! Pending confirmation model

use std::fmt;

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PendingConfirmation {
    pub id: i64,
    pub token: String,
    pub resource: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub target_id: Option<i64>,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Mutation deferred until its token is redeemed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmAction {
    Insert,
    Update,
    Replace,
    Delete,
}

impl ConfirmAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmAction::Insert => "insert",
            ConfirmAction::Update => "update",
            ConfirmAction::Replace => "replace",
            ConfirmAction::Delete => "delete",
        }
    }

    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "insert" => Some(ConfirmAction::Insert),
            "update" => Some(ConfirmAction::Update),
            "replace" => Some(ConfirmAction::Replace),
            "delete" => Some(ConfirmAction::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ConfirmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CreateConfirmationRequest {
    pub resource: String,
    pub action: ConfirmAction,
    pub payload: serde_json::Value,
    pub target_id: Option<i64>,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /confirms`
#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_parse_back() {
        for action in [ConfirmAction::Insert, ConfirmAction::Update, ConfirmAction::Replace, ConfirmAction::Delete] {
            assert_eq!(ConfirmAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(ConfirmAction::parse("upsert"), None);
        assert_eq!(ConfirmAction::Replace.to_string(), "replace");
    }
}
