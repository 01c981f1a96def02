use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use vps_api::{create_app, start_reconciler_task, Config};
use vps_orchestrator::db::{backup_database, create_pool, run_migrations};
use vps_orchestrator::VpsOrchestrator;
use vps_runtime::DockerRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = vps_logging::init_subscriber();

    info!("Starting vps-api service...");

    // Load configuration
    let config = Config::from_env();
    info!(
        "Configuration loaded: bind_addr={}, db_path={}",
        config.bind_addr,
        config.db_path.display()
    );
    let orchestrator_config = config.orchestrator_config()?;

    // Database setup
    let db_path = &config.db_path;

    // Backup before migrations
    if db_path.exists() {
        let backup_path = backup_database(db_path)?;
        info!("Database backed up to: {}", backup_path.display());
    }

    // Create pool and run migrations
    let pool = create_pool(db_path).await?;
    info!("Running database migrations...");
    run_migrations(&pool).await?;
    info!("Migrations complete");

    let runtime = Arc::new(DockerRuntime::new());
    let orchestrator = VpsOrchestrator::new(pool, runtime, orchestrator_config);

    // Start reconciler task
    if config.reconcile_interval_secs > 0 {
        tokio::spawn(start_reconciler_task(
            orchestrator.clone(),
            config.reconcile_interval_secs,
        ));
        info!(
            "Reconciler task started (interval: {}s)",
            config.reconcile_interval_secs
        );
    } else {
        info!("Reconciler disabled");
    }

    let app = create_app(orchestrator);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("vps-api stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
