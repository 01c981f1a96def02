use crate::{OrchestratorConfig, VpsOrchestrator};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use vps_runtime::mock::MockRuntime;

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    // One connection: every statement sees the same in-memory database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Config with short timeouts so timeout paths run quickly in tests.
pub fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        call_timeout: Duration::from_secs(2),
        build_timeout: Duration::from_secs(5),
        ..OrchestratorConfig::default()
    };
    config.session.window = Duration::from_millis(500);
    config.session.retry_after = Duration::from_secs(1);
    config
}

/// Orchestrator over a fresh in-memory database and mock engine.
pub async fn create_test_orchestrator() -> (VpsOrchestrator, MockRuntime) {
    create_test_orchestrator_with(test_config()).await
}

pub async fn create_test_orchestrator_with(
    config: OrchestratorConfig,
) -> (VpsOrchestrator, MockRuntime) {
    let pool = create_test_db().await;
    let runtime = MockRuntime::new();
    let orchestrator = VpsOrchestrator::new(pool, Arc::new(runtime.clone()), config);
    (orchestrator, runtime)
}
