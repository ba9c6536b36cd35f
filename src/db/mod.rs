//! Postgres persistence for the job queue and target records, plus an
//! in-memory implementation of both for tests and local runs.

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub mod jobs;
pub mod memory;
pub mod targets;

/// Open a pool sized for `max_connections` concurrent queries.
///
/// The worker needs roughly one connection per in-flight handler plus one
/// for polling, so callers size this from their concurrency.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let max_connections = max_connections.max(1);
    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
}

/// Apply the embedded migrations in `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}
