//! Record store for lifeplan: configuration, connection pool, migrations,
//! and the collection-scoped [`store::RecordStore`] interface.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use models::{Collection, Record};
pub use store::{PgRecordStore, RecordQuery, RecordStore, SortOrder, StoreError};

pub use sqlx::PgPool;
