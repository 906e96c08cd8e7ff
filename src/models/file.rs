//! Uploaded file model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredFile {
    pub id: i64,
    pub name: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    pub content_url: Option<String>,
    #[serde(skip_serializing, default)]
    pub storage_name: String,
    #[serde(rename = "_author")]
    pub author_id: Option<i64>,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

impl StoredFile {
    pub fn is_image(&self) -> bool {
        matches!(self.content_type.as_deref(), Some("image/png") | Some("image/jpeg"))
    }

    pub fn is_pdf(&self) -> bool {
        self.content_type.as_deref() == Some("application/pdf")
    }
}

#[derive(Debug, Clone)]
pub struct CreateFileRequest {
    pub name: Option<String>,
    pub content_type: String,
    pub size: i64,
    pub storage_name: String,
    pub content_url: String,
    pub author_id: Option<i64>,
}
