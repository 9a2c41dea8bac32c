//! Database query functions shared by every collection table.
//!
//! All tables have the same shape (`id`, `user_id`, `data`, `created_at`,
//! `updated_at`), so a single set of queries parameterised by
//! [`Collection`] covers them. Table names come from
//! [`Collection::table`] and are never user-supplied.

use anyhow::{Context, Result};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::{Collection, Record, RecordRow, strip_reserved};
use crate::store::{RecordQuery, SortOrder};

/// Insert a batch of records owned by `user_id` in one statement.
///
/// Returns the stored rows (with server-generated `id` and timestamps) in
/// insertion order.
pub async fn insert_records(
    pool: &PgPool,
    collection: Collection,
    user_id: &str,
    rows: Vec<Record>,
) -> Result<Vec<RecordRow>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new(format!("INSERT INTO {} (user_id, data) ", collection.table()));
    qb.push_values(rows, |mut b, row| {
        b.push_bind(user_id.to_owned())
            .push_bind(Value::Object(strip_reserved(row)));
    });
    qb.push(" RETURNING *");

    let inserted = qb
        .build_query_as::<RecordRow>()
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to insert into {collection}"))?;

    Ok(inserted)
}

/// Select records matching `query`. Rows are always scoped to the query's
/// owner.
pub async fn select_records(
    pool: &PgPool,
    collection: Collection,
    query: &RecordQuery,
) -> Result<Vec<RecordRow>> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "SELECT * FROM {} WHERE user_id = ",
        collection.table()
    ));
    qb.push_bind(query.user_id.clone());

    for (field, value) in &query.filters {
        if field == "id" {
            qb.push(" AND id::text = ");
        } else {
            qb.push(" AND data->>");
            qb.push_bind(field.clone());
            qb.push(" = ");
        }
        qb.push_bind(filter_text(value));
    }

    match &query.order_by {
        Some((field, order)) => {
            if field == "created_at" || field == "updated_at" {
                qb.push(format!(" ORDER BY {field}"));
            } else {
                qb.push(" ORDER BY data->");
                qb.push_bind(field.clone());
            }
            qb.push(match order {
                SortOrder::Asc => " ASC",
                SortOrder::Desc => " DESC",
            });
        }
        None => {
            qb.push(" ORDER BY created_at ASC");
        }
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit);
    }

    let rows = qb
        .build_query_as::<RecordRow>()
        .fetch_all(pool)
        .await
        .with_context(|| format!("failed to select from {collection}"))?;

    Ok(rows)
}

/// Merge `patch` into the fields of one record owned by `user_id`.
///
/// Returns `None` when no record matches the id/owner pair.
pub async fn update_record(
    pool: &PgPool,
    collection: Collection,
    user_id: &str,
    id: Uuid,
    patch: Record,
) -> Result<Option<RecordRow>> {
    let stmt = format!(
        "UPDATE {} SET data = data || $1, updated_at = now() \
         WHERE id = $2 AND user_id = $3 \
         RETURNING *",
        collection.table()
    );
    let row = sqlx::query_as::<_, RecordRow>(&stmt)
        .bind(Value::Object(strip_reserved(patch)))
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to update {collection} record {id}"))?;

    Ok(row)
}

/// `data->>'field'` yields text, so filter values are compared as text.
fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_text_unquotes_strings() {
        assert_eq!(filter_text(&json!("Inbox")), "Inbox");
        assert_eq!(filter_text(&json!(false)), "false");
        assert_eq!(filter_text(&json!(3)), "3");
    }
}
