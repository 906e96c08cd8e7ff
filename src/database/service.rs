//! Database service layer
//!
//! This module bundles the repositories behind one cloneable handle

use sqlx::{PgPool, Postgres, Transaction};
use crate::database::{
    DatabasePool, ResourceRepository, UserRepository, SessionRepository, EventRepository, PermissionRepository,
    ForwardRepository, ConfirmationRepository, FileRepository, TranslationRepository,
};
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct DatabaseService {
    pool: PgPool,
    pub resources: ResourceRepository,
    pub users: UserRepository,
    pub sessions: SessionRepository,
    pub events: EventRepository,
    pub permissions: PermissionRepository,
    pub forwards: ForwardRepository,
    pub confirmations: ConfirmationRepository,
    pub files: FileRepository,
    pub translations: TranslationRepository,
}

impl DatabaseService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            resources: ResourceRepository::new(pool.clone()),
            users: UserRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            events: EventRepository::new(pool.clone()),
            permissions: PermissionRepository::new(pool.clone()),
            forwards: ForwardRepository::new(pool.clone()),
            confirmations: ConfirmationRepository::new(pool.clone()),
            files: FileRepository::new(pool.clone()),
            translations: TranslationRepository::new(pool.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a transaction on the shared pool
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn health_check(&self) -> Result<()> {
        super::connection::ping(&self.pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[tokio::test]
    async fn test_database_service_creation() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgresql://test@localhost/test")
            .unwrap();
        let service = DatabaseService::new(pool);
        assert!(!service.pool().is_closed());
    }
}
