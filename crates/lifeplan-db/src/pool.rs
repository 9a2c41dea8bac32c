use std::time::Duration;

use anyhow::{Context, Result, bail};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;
use crate::models::Collection;

/// Migrations embedded at compile time from `crates/lifeplan-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

fn options(max_connections: u32) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    options(5)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to database at {}", config.database_url))
}

/// Create a pool that connects on first use, so the server starts even
/// while the database is unreachable.
pub fn create_lazy_pool(config: &DbConfig) -> Result<PgPool> {
    options(5)
        .connect_lazy(&config.database_url)
        .with_context(|| format!("invalid database URL {}", config.database_url))
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!("migrations applied");
    Ok(())
}

/// A pool on the `postgres` database of the same server.
pub async fn maintenance_pool(config: &DbConfig) -> Result<PgPool> {
    let url = config.maintenance_url();
    options(1)
        .connect(&url)
        .await
        .with_context(|| format!("failed to connect to maintenance database at {url}"))
}

/// `CREATE DATABASE` takes no bind parameters, so the name is spliced in
/// and must be a plain identifier.
fn checked_database_name(config: &DbConfig) -> Result<&str> {
    let name = config
        .database_name()
        .context("could not determine database name from URL")?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("database name {name:?} contains invalid characters");
    }
    Ok(name)
}

/// Create the configured database when it is missing.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = checked_database_name(config)?;
    let maint = maintenance_pool(config).await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&maint)
            .await
            .context("failed to query pg_database")?;

    if exists {
        info!(db = db_name, "database already exists");
    } else {
        maint
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
    }

    maint.close().await;
    Ok(())
}

/// Drop the configured database, disconnecting any remaining sessions.
pub async fn drop_database(config: &DbConfig) -> Result<()> {
    let db_name = checked_database_name(config)?;
    let maint = maintenance_pool(config).await?;

    sqlx::query(
        "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
         WHERE datname = $1 AND pid <> pg_backend_pid()",
    )
    .bind(db_name)
    .execute(&maint)
    .await
    .context("failed to disconnect sessions")?;
    maint
        .execute(format!("DROP DATABASE IF EXISTS {db_name}").as_str())
        .await
        .with_context(|| format!("failed to drop database {db_name}"))?;

    maint.close().await;
    Ok(())
}

/// Row count per collection table, in [`Collection::ALL`] order.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(String, i64)>> {
    let mut counts = Vec::with_capacity(Collection::ALL.len());
    for collection in Collection::ALL {
        let table = collection.table();
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table.to_owned(), count));
    }
    Ok(counts)
}
