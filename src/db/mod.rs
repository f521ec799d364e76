//! PostgreSQL pool and embedded schema for the schedule store.

use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::DatabaseConfig;

pub type DbPool = PgPool;

/// `schedule_entries` and `upload_logs`
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Name reported in `pg_stat_activity`
const APPLICATION_NAME: &str = "ramadan-ingest";

/// Readiness checks give up after this, whatever the pool's acquire timeout
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens the pool. Sessions run in UTC so `updated_at` and `created_at`
/// compare the same way regardless of the server's zone.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    let connect_options = config
        .url
        .parse::<PgConnectOptions>()?
        .application_name(APPLICATION_NAME)
        .options([("timezone", "UTC")]);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Some(config.idle_timeout))
        .max_lifetime(Some(config.max_lifetime))
        .connect_with(connect_options)
        .await?;

    log::info!(
        "Schedule database pool ready ({}..{} connections)",
        config.min_connections,
        config.max_connections
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    log::info!(
        "Schedule schema is up to date ({} migrations)",
        MIGRATOR.iter().count()
    );
    Ok(())
}

/// True when the database answers in time and the schedule table exists
pub async fn health_check(pool: &DbPool) -> bool {
    let check = sqlx::query_scalar::<_, bool>(
        "SELECT to_regclass('schedule_entries') IS NOT NULL",
    )
    .fetch_one(pool);

    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, check).await {
        Ok(Ok(ready)) => ready,
        Ok(Err(e)) => {
            log::warn!("Database health check failed: {}", e);
            false
        }
        Err(_) => {
            log::warn!("Database health check timed out after {:?}", HEALTH_CHECK_TIMEOUT);
            false
        }
    }
}
