//! Test data builders
//!
//! Inserts rows directly so tests can start from a known state without
//! going through the API.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;

use memberhub::services::AuthService;

pub const TEST_PASSWORD: &str = "correct horse battery";

/// Insert a member with [`TEST_PASSWORD`]
pub async fn create_user(pool: &PgPool, username: &str) -> i64 {
    let hash = AuthService::hash_password(TEST_PASSWORD).expect("Failed to hash password");
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (username, password, firstname, lastname, gender, email, membership)
        VALUES ($1, $2, $3, 'Tester', 'female', $4, 'regular')
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(hash)
    .bind(username)
    .bind(format!("{}@example.org", username))
    .fetch_one(pool)
    .await
    .expect("Failed to create user");
    id
}

/// Event whose registration is open right now
pub struct EventFixture {
    pub spots: i64,
    pub is_public: bool,
    pub additional_fields: Option<Value>,
    pub register_start: DateTime<Utc>,
    pub register_end: DateTime<Utc>,
}

impl Default for EventFixture {
    fn default() -> Self {
        Self {
            spots: 10,
            is_public: true,
            additional_fields: None,
            register_start: Utc::now() - Duration::days(1),
            register_end: Utc::now() + Duration::days(7),
        }
    }
}

pub async fn create_event(pool: &PgPool, fixture: EventFixture) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO events (title, is_public, spots, time_register_start, time_register_end, additional_fields)
        VALUES ('Sommerfest', $1, $2, $3, $4, $5)
        RETURNING id
        "#,
    )
    .bind(fixture.is_public)
    .bind(fixture.spots)
    .bind(fixture.register_start)
    .bind(fixture.register_end)
    .bind(fixture.additional_fields)
    .fetch_one(pool)
    .await
    .expect("Failed to create event");
    id
}

pub async fn grant_role(pool: &PgPool, user_id: i64, role: &str, expiry_date: DateTime<Utc>) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO permissions (user_id, role, expiry_date) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(user_id)
    .bind(role)
    .bind(expiry_date)
    .fetch_one(pool)
    .await
    .expect("Failed to grant role");
    id
}

pub async fn create_forward(pool: &PgPool, address: &str, owner_id: i64, is_public: bool) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO forwards (address, owner_id, is_public) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(address)
    .bind(owner_id)
    .bind(is_public)
    .fetch_one(pool)
    .await
    .expect("Failed to create forward");
    id
}
