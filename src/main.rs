//! MemberHub
//!
//! Main application entry point

use anyhow::Context;
use tokio::sync::watch;
use tracing::{error, info};

use memberhub::{
    config::Settings,
    database::{create_pool, run_migrations, DatabaseService},
    handlers::router,
    services::ServiceFactory,
    state::AppState,
    utils::logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Load configuration
    let settings = Settings::new().context("Failed to load configuration")?;
    settings.validate()?;

    // Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init_logging(&settings.logging)?;

    info!("Starting {}...", memberhub::info());

    // Initialize database connection
    info!("Connecting to database...");
    let db_pool = create_pool(&settings.database).await?;
    run_migrations(&db_pool).await?;

    let database = DatabaseService::new(db_pool);

    // Initialize services
    info!("Initializing services...");
    let services = ServiceFactory::new(settings.clone(), database.clone())?;

    if settings.forwards.enabled {
        match services.forward_service.resync_all().await {
            Ok(count) => info!(forwards = count, "Forward files written"),
            Err(e) => error!(error = %e, "Initial forward sync failed"),
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = tokio::spawn(services.maintenance_service.clone().run(shutdown_rx));

    let address = settings.bind_address();
    let app = router(AppState::from_factory(services, database, settings));

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!(address = %address, "MemberHub is ready!");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    maintenance.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
