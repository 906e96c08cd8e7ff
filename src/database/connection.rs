//! Pool setup, migrations and liveness

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use crate::config::settings::DatabaseConfig;
use crate::utils::errors::{MemberHubError, Result};

pub type DatabasePool = PgPool;

const CONNECT_ATTEMPTS: u32 = 5;
const FIRST_RETRY_DELAY: Duration = Duration::from_millis(500);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);
const MAX_LIFETIME: Duration = Duration::from_secs(1800);
const PING_TIMEOUT: Duration = Duration::from_secs(2);

pub fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .max_lifetime(MAX_LIFETIME)
}

/// Connect to the database, retrying with a doubling delay while it starts up
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool> {
    let mut delay = FIRST_RETRY_DELAY;
    let mut attempt = 1;

    loop {
        match pool_options(config).connect(&config.url).await {
            Ok(pool) => {
                info!(attempt, max_connections = config.max_connections, "Database pool ready");
                return Ok(pool);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, error = %e, retry_in_ms = delay.as_millis() as u64, "Database not reachable");
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

pub async fn run_migrations(pool: &DatabasePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

/// One round trip, bounded so a hanging database fails the health check
pub async fn ping(pool: &DatabasePool) -> Result<()> {
    tokio::time::timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(pool))
        .await
        .map_err(|_| MemberHubError::Database(sqlx::Error::PoolTimedOut))??;
    Ok(())
}
