//! Event and signup repository implementation
//!
//! The capacity check and the insert of a signup must see the same signup
//! count, so the signup queries take a connection and callers lock the event
//! row first.

use sqlx::{PgConnection, PgPool};
use crate::models::Event;
use crate::utils::errors::Result;

const EVENT_COLUMNS: &str = "id, title, time_start, time_end, location, description, is_public, price, spots, \
                             time_register_start, time_register_end, additional_fields, title_id, description_id, \
                             created_at, updated_at";

#[derive(Debug, Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find event by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<Event>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id, false).await
    }

    /// Find event by ID, optionally locking the row until the transaction ends
    pub async fn find(conn: &mut PgConnection, id: i64, lock: bool) -> Result<Option<Event>> {
        let lock = if lock { " FOR UPDATE" } else { "" };
        let event = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = $1{}",
            EVENT_COLUMNS, lock
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(event)
    }

    /// Get signup count for event
    pub async fn signup_count(conn: &mut PgConnection, event_id: i64) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_signups WHERE event_id = $1")
            .bind(event_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(count.0)
    }

    /// Check if a user or a guest address is already signed up
    pub async fn is_signed_up(
        conn: &mut PgConnection,
        event_id: i64,
        user_id: Option<i64>,
        email: Option<&str>,
    ) -> Result<bool> {
        let count: (i64,) = match user_id {
            Some(user_id) => {
                sqlx::query_as("SELECT COUNT(*) FROM event_signups WHERE event_id = $1 AND user_id = $2")
                    .bind(event_id)
                    .bind(user_id)
                    .fetch_one(&mut *conn)
                    .await?
            }
            None => {
                sqlx::query_as(
                    "SELECT COUNT(*) FROM event_signups WHERE event_id = $1 AND user_id IS NULL AND LOWER(email) = LOWER($2)"
                )
                .bind(event_id)
                .bind(email)
                .fetch_one(&mut *conn)
                .await?
            }
        };

        Ok(count.0 > 0)
    }
}
