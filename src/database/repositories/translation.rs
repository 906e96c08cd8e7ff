//! Translation repository implementation

use sqlx::PgPool;
use uuid::Uuid;
use crate::models::Translation;
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct TranslationRepository {
    pool: PgPool,
}

impl TranslationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All translations of the given localization ids
    pub async fn for_ids(&self, ids: &[Uuid]) -> Result<Vec<Translation>> {
        let translations = sqlx::query_as::<_, Translation>(
            "SELECT id, localization_id, language, content, created_at, updated_at \
             FROM translations WHERE localization_id = ANY($1)"
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(translations)
    }
}
