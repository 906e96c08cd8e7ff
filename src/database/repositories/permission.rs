//! Role grant repository implementation

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use crate::models::{ExpiringPermission, Permission};
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct PermissionRepository {
    pool: PgPool,
}

impl PermissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All grants of a user, expired ones included
    pub async fn for_user(&self, user_id: i64) -> Result<Vec<Permission>> {
        let permissions = sqlx::query_as::<_, Permission>(
            "SELECT id, user_id, role, expiry_date, expiry_warned, created_at, updated_at \
             FROM permissions WHERE user_id = $1 ORDER BY expiry_date"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    /// Unwarned grants expiring between now and `until`
    pub async fn expiring_before(&self, now: DateTime<Utc>, until: DateTime<Utc>) -> Result<Vec<ExpiringPermission>> {
        let permissions = sqlx::query_as::<_, ExpiringPermission>(
            r#"
            SELECT p.id, p.role, p.expiry_date, p.user_id, u.email, u.firstname
            FROM permissions p
            INNER JOIN users u ON u.id = p.user_id
            WHERE p.expiry_warned = FALSE AND p.expiry_date > $1 AND p.expiry_date <= $2
            ORDER BY p.expiry_date
            "#
        )
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(permissions)
    }

    pub async fn mark_warned(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE permissions SET expiry_warned = TRUE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
