//! Shared test utilities for lifeplan tests.
//!
//! Two kinds of record store:
//! - A PostgreSQL instance shared across tests, one database per test.
//!   With **`LIFEPLAN_TEST_PG_URL`** set the external server is used
//!   directly; otherwise a container is started via testcontainers and
//!   shared per binary through a `OnceCell`.
//! - [`MemoryStore`], an in-process `RecordStore` with failure injection,
//!   for pipeline tests that do not need SQL.

use sqlx::PgPool;
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use lifeplan_db::config::DbConfig;
use lifeplan_db::{PgRecordStore, pool};

mod memory;

pub use memory::MemoryStore;

/// Shared container state: base URL and optional container handle (kept alive).
struct SharedPg {
    base_url: String,
    /// Held to keep the container alive. `None` when using an external URL.
    _container: Option<ContainerAsync<Postgres>>,
}

/// Lazily-initialized shared PostgreSQL.
static SHARED_PG: OnceCell<SharedPg> = OnceCell::const_new();

async fn init_shared_pg() -> SharedPg {
    // If a setup script already started a container, use that directly.
    if let Ok(url) = std::env::var("LIFEPLAN_TEST_PG_URL") {
        return SharedPg {
            base_url: url,
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("18")
        .start()
        .await
        .expect("failed to start PostgreSQL container");

    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    let base_url = format!("postgresql://postgres:postgres@{host}:{port}");

    SharedPg {
        base_url,
        _container: Some(container),
    }
}

async fn pg_url() -> &'static str {
    let shared = SHARED_PG.get_or_init(init_shared_pg).await;
    &shared.base_url
}

fn test_db_config(base_url: &str, db_name: &str) -> DbConfig {
    DbConfig::new(format!("{base_url}/{db_name}"))
}

/// Create a uniquely-named database in the shared instance with
/// migrations applied. Pass the returned name to [`drop_test_db`].
pub async fn create_test_db() -> (PgPool, String) {
    let db_name = format!("lifeplan_test_{}", Uuid::new_v4().simple());
    let config = test_db_config(pg_url().await, &db_name);

    pool::ensure_database_exists(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to create temp database {db_name}: {e:#}"));
    let db_pool = pool::create_pool(&config)
        .await
        .unwrap_or_else(|e| panic!("failed to connect to temp database {db_name}: {e:#}"));
    pool::run_migrations(&db_pool)
        .await
        .expect("migrations should succeed");

    (db_pool, db_name)
}

/// Drop a database made by [`create_test_db`]. Cleanup failures are ignored.
pub async fn drop_test_db(db_name: &str) {
    let config = test_db_config(pg_url().await, db_name);
    let _ = pool::drop_database(&config).await;
}

/// [`create_test_db`] wrapped in a [`PgRecordStore`].
pub async fn create_test_store() -> (PgRecordStore, String) {
    let (db_pool, db_name) = create_test_db().await;
    (PgRecordStore::new(db_pool), db_name)
}
