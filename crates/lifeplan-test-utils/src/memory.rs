use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use lifeplan_db::models::strip_reserved;
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore, SortOrder, StoreError};

/// In-memory [`RecordStore`].
///
/// Mirrors the PostgreSQL store's observable behaviour: server-assigned
/// UUID ids and timestamps, owner scoping, equality filters, ordering and
/// limits. Individual collections can be made to reject writes, and all
/// selects can be made to fail, to exercise error paths.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<Collection, Vec<Record>>>,
    failing_writes: Mutex<HashSet<Collection>>,
    failing_selects: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert/update against `collection` fail.
    pub fn fail_on(&self, collection: Collection) {
        lock(&self.failing_writes).insert(collection);
    }

    /// Make every select fail.
    pub fn fail_selects(&self) {
        *lock(&self.failing_selects) = true;
    }

    /// All rows currently in `collection`, regardless of owner.
    pub fn rows(&self, collection: Collection) -> Vec<Record> {
        lock(&self.rows)
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed rows directly, bypassing failure injection.
    pub fn seed(&self, collection: Collection, user_id: &str, rows: Vec<Value>) -> Vec<Record> {
        let records: Vec<Record> = rows
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .map(|fields| stamp(fields, user_id))
            .collect();
        lock(&self.rows)
            .entry(collection)
            .or_default()
            .extend(records.iter().cloned());
        records
    }

    fn check_write(&self, collection: Collection) -> Result<(), StoreError> {
        if lock(&self.failing_writes).contains(&collection) {
            return Err(StoreError::Rejected {
                collection,
                reason: "injected write failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(
        &self,
        collection: Collection,
        user_id: &str,
        rows: Vec<Record>,
    ) -> Result<Vec<Record>, StoreError> {
        self.check_write(collection)?;
        let records: Vec<Record> = rows.into_iter().map(|r| stamp(r, user_id)).collect();
        lock(&self.rows)
            .entry(collection)
            .or_default()
            .extend(records.iter().cloned());
        Ok(records)
    }

    async fn select(
        &self,
        collection: Collection,
        query: &RecordQuery,
    ) -> Result<Vec<Record>, StoreError> {
        if *lock(&self.failing_selects) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected select failure on {collection}"
            )));
        }

        let mut matched: Vec<Record> = lock(&self.rows)
            .get(&collection)
            .map(|rows| {
                rows.iter()
                    .filter(|r| r.get("user_id") == Some(&Value::String(query.user_id.clone())))
                    .filter(|r| {
                        query
                            .filters
                            .iter()
                            .all(|(field, value)| r.get(field) == Some(value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, order)) = &query.order_by {
            matched.sort_by(|a, b| {
                let ord = compare(a.get(field), b.get(field));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }

        if let Some(limit) = query.limit {
            matched.truncate(usize::try_from(limit).unwrap_or(0));
        }
        Ok(matched)
    }

    async fn update(
        &self,
        collection: Collection,
        user_id: &str,
        id: &str,
        patch: Record,
    ) -> Result<Option<Record>, StoreError> {
        self.check_write(collection)?;
        let mut rows = lock(&self.rows);
        let Some(row) = rows.get_mut(&collection).and_then(|rows| {
            rows.iter_mut().find(|r| {
                r.get("id").and_then(Value::as_str) == Some(id)
                    && r.get("user_id").and_then(Value::as_str) == Some(user_id)
            })
        }) else {
            return Ok(None);
        };
        for (k, v) in strip_reserved(patch) {
            row.insert(k, v);
        }
        row.insert("updated_at".into(), Value::String(now()));
        Ok(Some(row.clone()))
    }
}

fn stamp(fields: Record, user_id: &str) -> Record {
    let mut record = strip_reserved(fields);
    let ts = now();
    record.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    record.insert("user_id".into(), Value::String(user_id.to_owned()));
    record.insert("created_at".into(), Value::String(ts.clone()));
    record.insert("updated_at".into(), Value::String(ts));
    record
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn select_is_owner_scoped_and_filtered() {
        let store = MemoryStore::new();
        store
            .insert(
                Collection::Groceries,
                "alice",
                vec![
                    record(json!({ "item_name": "Milk", "bought": false })),
                    record(json!({ "item_name": "Rice", "bought": true })),
                ],
            )
            .await
            .unwrap();
        store
            .insert(
                Collection::Groceries,
                "bob",
                vec![record(json!({ "item_name": "Eggs", "bought": false }))],
            )
            .await
            .unwrap();

        let rows = store
            .select(
                Collection::Groceries,
                &RecordQuery::owned_by("alice").filter("bought", false),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["item_name"], "Milk");
    }

    #[tokio::test]
    async fn injected_write_failure_rejects() {
        let store = MemoryStore::new();
        store.fail_on(Collection::Tasks);
        let err = store
            .insert(Collection::Tasks, "u", vec![record(json!({ "title": "x" }))])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
        assert!(store.rows(Collection::Tasks).is_empty());
    }

    #[tokio::test]
    async fn update_merges_fields_for_owner_only() {
        let store = MemoryStore::new();
        let inserted = store
            .insert(
                Collection::LearningPlans,
                "alice",
                vec![record(json!({ "topic": "Rust", "duration_months": 1 }))],
            )
            .await
            .unwrap();
        let id = inserted[0]["id"].as_str().unwrap().to_owned();

        let other = store
            .update(
                Collection::LearningPlans,
                "bob",
                &id,
                record(json!({ "duration_months": 9 })),
            )
            .await
            .unwrap();
        assert!(other.is_none());

        let updated = store
            .update(
                Collection::LearningPlans,
                "alice",
                &id,
                record(json!({ "duration_months": 2, "id": "spoofed" })),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["duration_months"], 2);
        assert_eq!(updated["topic"], "Rust");
        assert_eq!(updated["id"], json!(id));
    }
}
