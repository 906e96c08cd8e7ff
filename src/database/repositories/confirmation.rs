//! Pending confirmation repository implementation

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use crate::models::{CreateConfirmationRequest, PendingConfirmation};
use crate::utils::errors::Result;

const CONFIRMATION_COLUMNS: &str = "id, token, resource, action, payload, target_id, email, expires_at, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct ConfirmationRepository {
    pool: PgPool,
}

impl ConfirmationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, token: &str, request: CreateConfirmationRequest) -> Result<PendingConfirmation> {
        let confirmation = sqlx::query_as::<_, PendingConfirmation>(&format!(
            r#"
            INSERT INTO pending_confirmations (token, resource, action, payload, target_id, email, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            CONFIRMATION_COLUMNS
        ))
        .bind(token)
        .bind(request.resource)
        .bind(request.action.as_str())
        .bind(sqlx::types::Json(request.payload))
        .bind(request.target_id)
        .bind(request.email)
        .bind(request.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(confirmation)
    }

    /// Find a confirmation and lock it until the transaction ends
    pub async fn lock_by_token(conn: &mut PgConnection, token: &str) -> Result<Option<PendingConfirmation>> {
        let confirmation = sqlx::query_as::<_, PendingConfirmation>(&format!(
            "SELECT {} FROM pending_confirmations WHERE token = $1 FOR UPDATE",
            CONFIRMATION_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(confirmation)
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM pending_confirmations WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    pub async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM pending_confirmations WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
