//! The `RecordStore` trait -- collection-scoped persistence with row-level
//! ownership.
//!
//! The pipeline only ever talks to `dyn RecordStore`. [`PgRecordStore`] is
//! the production implementation; tests use the in-memory store from
//! `lifeplan-test-utils`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Collection, Record};
use crate::queries::records;

/// Errors surfaced by a [`RecordStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store refused the operation (constraint, permission, injected
    /// failure).
    #[error("{collection} rejected the operation: {reason}")]
    Rejected {
        collection: Collection,
        reason: String,
    },

    /// Connection or query failure.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Sort direction for [`RecordQuery::order_by`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// A select-by-filter request. Always scoped to a single owner.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub user_id: String,
    /// Equality filters on record fields (`id` matches the record id).
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, SortOrder)>,
    pub limit: Option<i64>,
}

impl RecordQuery {
    /// Start a query over records owned by `user_id`.
    pub fn owned_by(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((field.into(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Collection-scoped insert / select / update.
///
/// Implementations must be stateless connectors (or internally
/// synchronized) so a single instance can be shared across requests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert `rows` owned by `user_id` as one batch. Returns the stored
    /// records in insertion order.
    async fn insert(
        &self,
        collection: Collection,
        user_id: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError>;

    /// Return the records matching `query`.
    async fn select(
        &self,
        collection: Collection,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError>;

    /// Merge `patch` into the record `id` owned by `user_id`. Returns `None`
    /// if the pair does not resolve.
    async fn update(
        &self,
        collection: Collection,
        user_id: &str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Record>, StoreError>;
}

// Compile-time assertion: RecordStore must be usable as `dyn RecordStore`.
const _: () = {
    fn _assert_object_safe(_: &dyn RecordStore) {}
};

/// PostgreSQL-backed [`RecordStore`].
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(
        &self,
        collection: Collection,
        user_id: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        let rows = records::insert_records(&self.pool, collection, user_id, rows).await?;
        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn select(
        &self,
        collection: Collection,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError> {
        let rows = records::select_records(&self.pool, collection, query).await?;
        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn update(
        &self,
        collection: Collection,
        user_id: &str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Record>, StoreError> {
        // Ids are UUIDs; anything else cannot name a row.
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        let row = records::update_record(&self.pool, collection, user_id, id, patch).await?;
        Ok(row.map(|r| r.into_record()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_builder_accumulates() {
        let q = RecordQuery::owned_by("u-1")
            .filter("bought", false)
            .order_by("created_at", SortOrder::Desc)
            .limit(5);
        assert_eq!(q.user_id, "u-1");
        assert_eq!(q.filters, vec![("bought".to_string(), json!(false))]);
        assert_eq!(q.order_by, Some(("created_at".to_string(), SortOrder::Desc)));
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn rejected_error_names_collection() {
        let err = StoreError::Rejected {
            collection: Collection::Groceries,
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "groceries rejected the operation: quota exceeded"
        );
    }
}
