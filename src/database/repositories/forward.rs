//! Mail forward repository implementation

use sqlx::PgPool;
use crate::models::Forward;
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct ForwardRepository {
    pool: PgPool,
}

impl ForwardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Forward>> {
        let forward = sqlx::query_as::<_, Forward>(
            "SELECT id, address, owner_id, is_public, created_at, updated_at FROM forwards WHERE id = $1"
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(forward)
    }

    /// Every address mail to the forward is delivered to: subscribed users'
    /// emails and external addresses, sorted and without duplicates
    pub async fn recipients(&self, forward_id: i64) -> Result<Vec<String>> {
        let recipients: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT address FROM (
                SELECT LOWER(u.email) AS address
                FROM forward_users fu
                INNER JOIN users u ON u.id = fu.user_id
                WHERE fu.forward_id = $1
                UNION
                SELECT LOWER(fa.address) AS address
                FROM forward_addresses fa
                WHERE fa.forward_id = $1
            ) recipients
            ORDER BY address
            "#
        )
        .bind(forward_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(recipients.into_iter().map(|(address,)| address).collect())
    }

    /// Forwards a user is subscribed to
    pub async fn forwards_of_user(&self, user_id: i64) -> Result<Vec<i64>> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT forward_id FROM forward_users WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    /// Forwards owned by a user
    pub async fn owned_by(&self, user_id: i64) -> Result<Vec<Forward>> {
        let forwards = sqlx::query_as::<_, Forward>(
            "SELECT id, address, owner_id, is_public, created_at, updated_at FROM forwards WHERE owner_id = $1 ORDER BY id"
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(forwards)
    }

    /// Another forward whose address has the same local part, ignoring case
    pub async fn find_by_local_part(&self, address: &str, exclude_id: Option<i64>) -> Result<Option<Forward>> {
        let forward = sqlx::query_as::<_, Forward>(
            r#"
            SELECT id, address, owner_id, is_public, created_at, updated_at
            FROM forwards
            WHERE LOWER(split_part(address, '@', 1)) = LOWER(split_part($1, '@', 1))
              AND ($2::BIGINT IS NULL OR id <> $2)
            LIMIT 1
            "#
        )
        .bind(address)
        .bind(exclude_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(forward)
    }

    pub async fn list_all(&self) -> Result<Vec<Forward>> {
        let forwards = sqlx::query_as::<_, Forward>(
            "SELECT id, address, owner_id, is_public, created_at, updated_at FROM forwards ORDER BY id"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(forwards)
    }
}
