//! Mailing list forwarder sync
//!
//! The mail server reads one file per forward listing every address mail to
//! the forward is delivered to. The files are rewritten after every change to
//! a forward or its subscriptions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::settings::ForwardsConfig;
use crate::database::ForwardRepository;
use crate::models::Forward;
use crate::utils::errors::Result;
use crate::utils::helpers::email_local_part;

/// Target the forward lists are written to
#[async_trait]
pub trait ForwardSync: Send + Sync {
    async fn sync(&self, forward: &Forward, recipients: &[String]) -> Result<()>;
    async fn remove(&self, address: &str) -> Result<()>;
}

/// Writes `<dir>/.forward+<local part>` files, one recipient per line.
///
/// Forward addresses are unique by local part, so each forward has a file of
/// its own.
#[derive(Debug, Clone)]
pub struct FileForwardSync {
    directory: PathBuf,
}

impl FileForwardSync {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, address: &str) -> PathBuf {
        self.directory.join(format!(".forward+{}", email_local_part(address)))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

#[async_trait]
impl ForwardSync for FileForwardSync {
    async fn sync(&self, forward: &Forward, recipients: &[String]) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let path = self.path_for(&forward.address);
        // unique per write, outside the `.forward+` namespace
        let staging = self.directory.join(format!(".staging-{}", Uuid::new_v4().simple()));
        let mut contents = recipients.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }

        tokio::fs::write(&staging, contents).await?;
        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        debug!(forward_id = forward.id, path = %path.display(), recipients = recipients.len(), "Forward file written");
        Ok(())
    }

    async fn remove(&self, address: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(address)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Used when forward syncing is disabled
#[derive(Debug, Clone, Default)]
pub struct NoopForwardSync;

#[async_trait]
impl ForwardSync for NoopForwardSync {
    async fn sync(&self, _forward: &Forward, _recipients: &[String]) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _address: &str) -> Result<()> {
        Ok(())
    }
}

/// Forward lists touched by deleting a user, captured before the delete
#[derive(Debug, Clone, Default)]
pub struct UserForwards {
    pub subscribed: Vec<i64>,
    pub owned: Vec<Forward>,
}

/// Forward service keeping the forward files current
#[derive(Clone)]
pub struct ForwardService {
    forwards: ForwardRepository,
    target: Arc<dyn ForwardSync>,
}

impl ForwardService {
    pub fn new(forwards: ForwardRepository, target: Arc<dyn ForwardSync>) -> Self {
        Self { forwards, target }
    }

    /// Service writing to the target selected in the configuration
    pub fn from_config(forwards: ForwardRepository, config: &ForwardsConfig) -> Self {
        let target: Arc<dyn ForwardSync> = if config.enabled {
            Arc::new(FileForwardSync::new(&config.directory))
        } else {
            Arc::new(NoopForwardSync)
        };
        Self::new(forwards, target)
    }

    /// Rewrite the list of one forward. Deleted forwards are skipped.
    pub async fn resync(&self, forward_id: i64) -> Result<()> {
        let Some(forward) = self.forwards.find_by_id(forward_id).await? else {
            return Ok(());
        };
        let recipients = self.forwards.recipients(forward.id).await?;
        self.target.sync(&forward, &recipients).await
    }

    /// Rewrite the lists of every forward a user is subscribed to
    pub async fn resync_user(&self, user_id: i64) -> Result<()> {
        for forward_id in self.forwards.forwards_of_user(user_id).await? {
            self.resync(forward_id).await?;
        }
        Ok(())
    }

    /// Rewrite every list
    pub async fn resync_all(&self) -> Result<usize> {
        let forwards = self.forwards.list_all().await?;
        for forward in &forwards {
            let recipients = self.forwards.recipients(forward.id).await?;
            self.target.sync(forward, &recipients).await?;
        }
        info!(count = forwards.len(), "All forward lists written");
        Ok(forwards.len())
    }

    /// Snapshot of the forwards a user is subscribed to or owns
    pub async fn user_forwards(&self, user_id: i64) -> Result<UserForwards> {
        Ok(UserForwards {
            subscribed: self.forwards.forwards_of_user(user_id).await?,
            owned: self.forwards.owned_by(user_id).await?,
        })
    }

    /// Bring the lists in line after the user is gone. Owned forwards were
    /// deleted with the user, so their files are removed; the remaining
    /// subscriptions are rewritten without the user's address.
    pub async fn apply_user_removal(&self, forwards: UserForwards) {
        for forward in &forwards.owned {
            if let Err(e) = self.target.remove(&forward.address).await {
                error!(forward_id = forward.id, error = %e, "Failed to remove forward list");
            }
        }
        for forward_id in forwards.subscribed {
            if forwards.owned.iter().any(|f| f.id == forward_id) {
                continue;
            }
            self.resync_logged(forward_id).await;
        }
    }

    /// Drop the list of a deleted or renamed forward
    pub async fn remove(&self, address: &str) -> Result<()> {
        self.target.remove(address).await
    }

    /// Like [`resync`](Self::resync), logging failures instead of returning them
    pub async fn resync_logged(&self, forward_id: i64) {
        if let Err(e) = self.resync(forward_id).await {
            error!(forward_id = forward_id, error = %e, "Failed to sync forward list");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn forward(address: &str) -> Forward {
        Forward {
            id: 1,
            address: address.to_string(),
            owner_id: 1,
            is_public: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_file_sync_writes_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileForwardSync::new(dir.path());

        let recipients = vec!["a@example.org".to_string(), "b@example.org".to_string()];
        sync.sync(&forward("kultur@example.org"), &recipients).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join(".forward+kultur")).unwrap();
        assert_eq!(written, "a@example.org\nb@example.org\n");
    }

    #[tokio::test]
    async fn test_file_sync_remove() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileForwardSync::new(dir.path());

        sync.sync(&forward("kultur@example.org"), &[]).await.unwrap();
        assert!(sync.path_for("kultur@example.org").exists());

        sync.remove("kultur@example.org").await.unwrap();
        assert!(!sync.path_for("kultur@example.org").exists());
        sync.remove("kultur@example.org").await.unwrap();
    }

    #[tokio::test]
    async fn test_dotted_local_parts_keep_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileForwardSync::new(dir.path());

        sync.sync(&forward("team.tmp@example.org"), &["a@example.org".to_string()])
            .await
            .unwrap();
        sync.sync(&forward("team.lead@example.org"), &["b@example.org".to_string()])
            .await
            .unwrap();

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec![".forward+team.lead", ".forward+team.tmp"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".forward+team.tmp")).unwrap(),
            "a@example.org\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".forward+team.lead")).unwrap(),
            "b@example.org\n"
        );
    }

    #[tokio::test]
    async fn test_concurrent_syncs_leave_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let sync = Arc::new(FileForwardSync::new(dir.path()));

        let mut tasks = Vec::new();
        for n in 0..8 {
            let sync = sync.clone();
            tasks.push(tokio::spawn(async move {
                let recipients = vec![format!("member{}@example.org", n)];
                sync.sync(&forward("team.lead@example.org"), &recipients).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let written = std::fs::read_to_string(dir.path().join(".forward+team.lead")).unwrap();
        assert!(written.starts_with("member") && written.ends_with("@example.org\n"));
    }

    #[tokio::test]
    async fn test_user_removal_drops_owned_files() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileForwardSync::new(dir.path());
        sync.sync(&forward("alex.team@example.org"), &["kim@example.org".to_string()])
            .await
            .unwrap();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgresql://nobody@localhost:1/unused")
            .unwrap();
        let service = ForwardService::new(ForwardRepository::new(pool), Arc::new(sync.clone()));

        // the only subscription is to the owned forward, so nothing is queried
        service
            .apply_user_removal(UserForwards {
                subscribed: vec![1],
                owned: vec![forward("alex.team@example.org")],
            })
            .await;

        assert!(!sync.path_for("alex.team@example.org").exists());
    }
}
