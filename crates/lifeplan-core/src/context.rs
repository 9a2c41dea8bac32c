//! Per-request snapshot of a user's existing state, used to personalize
//! the classification prompt.

use lifeplan_db::models::strip_reserved;
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore, SortOrder};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Bounded, read-only view of a user's data. Built fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserContext {
    pub profile: Record,
    pub recent_tasks: Vec<Record>,
    pub pending_groceries: Vec<Record>,
    pub recent_expenses: Vec<Record>,
    pub upcoming_commitments: Vec<Record>,
    pub recent_learning_plans: Vec<Record>,
}

struct Slice {
    collection: Collection,
    fields: &'static [&'static str],
    filter: Option<(&'static str, Value)>,
    order_by: &'static str,
    limit: i64,
}

/// Fetch the snapshot. Each part is fetched independently; a failed fetch
/// leaves that part empty.
pub async fn gather_context(store: &dyn RecordStore, user_id: &str) -> UserContext {
    let profile = match store
        .select(Collection::Users, &RecordQuery::owned_by(user_id).limit(1))
        .await
    {
        Ok(rows) => rows.into_iter().next().map(strip_reserved).unwrap_or_default(),
        Err(e) => {
            warn!(user_id, collection = %Collection::Users, error = %e, "context fetch failed");
            Record::new()
        }
    };

    UserContext {
        profile,
        recent_tasks: fetch(
            store,
            user_id,
            Slice {
                collection: Collection::Tasks,
                fields: &["title", "due_date_utc", "status", "priority"],
                filter: None,
                order_by: "created_at",
                limit: 5,
            },
        )
        .await,
        pending_groceries: fetch(
            store,
            user_id,
            Slice {
                collection: Collection::Groceries,
                fields: &["item_name", "quantity", "unit", "bought"],
                filter: Some(("bought", Value::Bool(false))),
                order_by: "created_at",
                limit: 5,
            },
        )
        .await,
        recent_expenses: fetch(
            store,
            user_id,
            Slice {
                collection: Collection::Expenses,
                fields: &["category", "amount", "expense_date"],
                filter: None,
                order_by: "created_at",
                limit: 5,
            },
        )
        .await,
        upcoming_commitments: fetch(
            store,
            user_id,
            Slice {
                collection: Collection::Commitments,
                fields: &["title", "type", "start_time"],
                filter: None,
                order_by: "start_time",
                limit: 3,
            },
        )
        .await,
        recent_learning_plans: fetch(
            store,
            user_id,
            Slice {
                collection: Collection::LearningPlans,
                fields: &["topic", "duration_months"],
                filter: None,
                order_by: "created_at",
                limit: 3,
            },
        )
        .await,
    }
}

async fn fetch(store: &dyn RecordStore, user_id: &str, slice: Slice) -> Vec<Record> {
    let mut query = RecordQuery::owned_by(user_id)
        .order_by(slice.order_by, SortOrder::Desc)
        .limit(slice.limit);
    if let Some((field, value)) = slice.filter {
        query = query.filter(field, value);
    }

    match store.select(slice.collection, &query).await {
        Ok(rows) => rows
            .into_iter()
            .map(|row| project(row, slice.fields))
            .collect(),
        Err(e) => {
            warn!(user_id, collection = %slice.collection, error = %e, "context fetch failed");
            Vec::new()
        }
    }
}

fn project(row: Record, fields: &[&str]) -> Record {
    row.into_iter()
        .filter(|(k, _)| fields.contains(&k.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeplan_test_utils::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn snapshot_is_bounded_and_projected() {
        let store = MemoryStore::new();
        store.seed(
            Collection::Groceries,
            "u",
            (0..8)
                .map(|i| json!({ "item_name": format!("item {i}"), "bought": false, "price": 10 }))
                .collect(),
        );
        store.seed(
            Collection::Groceries,
            "u",
            vec![json!({ "item_name": "bought already", "bought": true })],
        );
        store.seed(
            Collection::Commitments,
            "u",
            (0..5)
                .map(|i| json!({ "title": format!("c{i}"), "start_time": format!("2026-10-2{i}T10:00:00Z") }))
                .collect(),
        );
        store.seed(Collection::Users, "u", vec![json!({ "name": "Asha" })]);

        let ctx = gather_context(&store, "u").await;
        assert_eq!(ctx.pending_groceries.len(), 5);
        assert!(ctx.pending_groceries.iter().all(|g| g["bought"] == false));
        assert!(ctx.pending_groceries.iter().all(|g| !g.contains_key("price")));
        assert_eq!(ctx.upcoming_commitments.len(), 3);
        assert_eq!(ctx.upcoming_commitments[0]["title"], "c4");
        assert_eq!(ctx.profile["name"], "Asha");
        assert!(!ctx.profile.contains_key("id"));
        assert!(ctx.recent_tasks.is_empty());
    }

    #[tokio::test]
    async fn fetch_failures_degrade_to_empty() {
        let store = MemoryStore::new();
        store.seed(Collection::Tasks, "u", vec![json!({ "title": "x" })]);
        store.fail_selects();

        let ctx = gather_context(&store, "u").await;
        assert_eq!(ctx, UserContext::default());
    }

    #[tokio::test]
    async fn other_users_are_invisible() {
        let store = MemoryStore::new();
        store.seed(Collection::Tasks, "someone-else", vec![json!({ "title": "secret" })]);
        let ctx = gather_context(&store, "u").await;
        assert!(ctx.recent_tasks.is_empty());
    }
}
