//! User repository implementation

use sqlx::PgPool;
use crate::models::User;
use crate::utils::errors::Result;

const USER_COLUMNS: &str = "id, username, password, firstname, lastname, birthday, legi, rfid, nethz, department, \
                            phone, ldap_address, gender, email, membership, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find user by ID
    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    /// Find user by username or email, case-insensitive
    pub async fn find_by_login(&self, login: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1) \
             ORDER BY (LOWER(username) = LOWER($1)) DESC LIMIT 1",
            USER_COLUMNS
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Email addresses of the given users
    pub async fn emails(&self, ids: &[i64]) -> Result<Vec<String>> {
        let emails: Vec<(String,)> = sqlx::query_as("SELECT email FROM users WHERE id = ANY($1) ORDER BY email")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(emails.into_iter().map(|(email,)| email).collect())
    }

    /// Count total users
    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }
}
