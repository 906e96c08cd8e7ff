//! User model

use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub firstname: String,
    pub lastname: String,
    pub birthday: Option<NaiveDate>,
    pub legi: Option<String>,
    pub rfid: Option<String>,
    pub nethz: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub ldap_address: Option<String>,
    pub gender: String,
    pub email: String,
    pub membership: String,
    #[serde(rename = "_created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "_updated")]
    pub updated_at: DateTime<Utc>,
}

/// Fields non-admins may not change on their own account
pub const ADMIN_ONLY_USER_FIELDS: &[&str] = &[
    "username",
    "firstname",
    "lastname",
    "birthday",
    "legi",
    "nethz",
    "department",
    "phone",
    "ldap_address",
    "gender",
    "membership",
];

/// Body of `POST /sessions`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    /// Username or email address
    pub username: String,
    pub password: String,
}
