//! Media storage
//!
//! Uploaded bytes live in `storage.media_dir` under a generated name; the
//! `files` table keeps the metadata and the URL they are served from.

use std::path::PathBuf;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::settings::StorageConfig;
use crate::database::FileRepository;
use crate::models::{CreateFileRequest, StoredFile};
use crate::utils::errors::{MemberHubError, Result};
use crate::utils::helpers::sanitize_filename;

pub const STORAGE_ROUTE: &str = "/storage";

/// Content type of an upload, sniffed from its first bytes when possible
pub fn detect_content_type(declared: Option<&str>, bytes: &[u8]) -> String {
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png".to_string()
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg".to_string()
    } else if bytes.starts_with(b"%PDF") {
        "application/pdf".to_string()
    } else {
        declared
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("application/octet-stream")
            .to_string()
    }
}

/// Media service storing uploads on disk
#[derive(Clone)]
pub struct MediaService {
    root: PathBuf,
    max_upload_bytes: usize,
    files: FileRepository,
}

impl MediaService {
    pub fn new(config: &StorageConfig, files: FileRepository) -> Self {
        Self {
            root: PathBuf::from(&config.media_dir),
            max_upload_bytes: config.max_upload_bytes,
            files,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Store an upload and record it
    pub async fn upload(
        &self,
        name: Option<String>,
        declared_type: Option<&str>,
        bytes: &[u8],
        author_id: Option<i64>,
    ) -> Result<StoredFile> {
        if bytes.is_empty() {
            return Err(MemberHubError::issue("data", "file must not be empty"));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(MemberHubError::issue(
                "data",
                format!("file is larger than {} bytes", self.max_upload_bytes),
            ));
        }

        let storage_name = match name.as_deref().map(sanitize_filename).filter(|n| !n.is_empty()) {
            Some(clean) => format!("{}_{}", Uuid::new_v4().simple(), clean),
            None => Uuid::new_v4().simple().to_string(),
        };

        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&storage_name), bytes).await?;

        let file = self
            .files
            .create(CreateFileRequest {
                name,
                content_type: detect_content_type(declared_type, bytes),
                size: bytes.len() as i64,
                content_url: format!("{}/{}", STORAGE_ROUTE, storage_name),
                storage_name: storage_name.clone(),
                author_id,
            })
            .await;

        match file {
            Ok(file) => {
                info!(file_id = file.id, size = bytes.len(), "File uploaded");
                Ok(file)
            }
            Err(e) => {
                self.remove(&storage_name).await?;
                Err(e)
            }
        }
    }

    /// Bytes and metadata of a stored file
    pub async fn load(&self, storage_name: &str) -> Result<(StoredFile, Vec<u8>)> {
        let not_found = || MemberHubError::not_found("file", storage_name);

        if storage_name.contains(['/', '\\']) || storage_name.starts_with('.') {
            return Err(not_found());
        }
        let file = self
            .files
            .find_by_storage_name(storage_name)
            .await?
            .ok_or_else(not_found)?;

        match tokio::fs::read(self.root.join(storage_name)).await {
            Ok(bytes) => Ok((file, bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the bytes of a file whose row is gone
    pub async fn remove(&self, storage_name: &str) -> Result<()> {
        match tokio::fs::remove_file(self.root.join(storage_name)).await {
            Ok(()) => {
                debug!(storage_name = storage_name, "Stored file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find(&self, id: i64) -> Result<Option<StoredFile>> {
        self.files.find_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type(None, b"\x89PNG\r\n\x1a\nrest"), "image/png");
        assert_eq!(detect_content_type(Some("text/plain"), &[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(detect_content_type(None, b"%PDF-1.7"), "application/pdf");
        assert_eq!(detect_content_type(Some("text/plain"), b"hello"), "text/plain");
        assert_eq!(detect_content_type(Some(""), b"hello"), "application/octet-stream");
    }

    fn media_service(max_upload_bytes: usize) -> MediaService {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://nobody@localhost:1/unused")
            .unwrap();
        let config = StorageConfig {
            media_dir: std::env::temp_dir().join("memberhub-media-test").display().to_string(),
            max_upload_bytes,
        };
        MediaService::new(&config, FileRepository::new(pool))
    }

    #[test]
    fn test_upload_limits() {
        tokio_test::block_on(async {
            let media = media_service(4);
            let empty = media.upload(None, None, b"", None).await;
            assert!(matches!(empty, Err(MemberHubError::Validation(issues)) if issues.contains_key("data")));

            let big = media.upload(Some("a.txt".to_string()), None, b"12345", None).await;
            assert!(matches!(big, Err(MemberHubError::Validation(issues)) if issues["data"].contains("4 bytes")));
        });
    }

    #[test]
    fn test_load_rejects_paths() {
        tokio_test::block_on(async {
            let media = media_service(4);
            for name in ["../secret", ".env", "a/b"] {
                assert!(matches!(media.load(name).await, Err(MemberHubError::NotFound { .. })));
            }
        });
    }
}
