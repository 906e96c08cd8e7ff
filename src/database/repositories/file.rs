//! Uploaded file repository implementation

use sqlx::PgPool;
use crate::models::{CreateFileRequest, StoredFile};
use crate::utils::errors::Result;

const FILE_COLUMNS: &str = "id, name, content_type, size, content_url, storage_name, author_id, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, request: CreateFileRequest) -> Result<StoredFile> {
        let file = sqlx::query_as::<_, StoredFile>(&format!(
            r#"
            INSERT INTO files (name, content_type, size, content_url, storage_name, author_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            FILE_COLUMNS
        ))
        .bind(request.name)
        .bind(request.content_type)
        .bind(request.size)
        .bind(request.content_url)
        .bind(request.storage_name)
        .bind(request.author_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(file)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(&format!("SELECT {} FROM files WHERE id = $1", FILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(file)
    }

    pub async fn find_by_storage_name(&self, storage_name: &str) -> Result<Option<StoredFile>> {
        let file = sqlx::query_as::<_, StoredFile>(&format!(
            "SELECT {} FROM files WHERE storage_name = $1",
            FILE_COLUMNS
        ))
        .bind(storage_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }
}
