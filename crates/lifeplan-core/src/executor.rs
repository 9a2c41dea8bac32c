//! Persists `create_item` payloads.

use std::sync::Arc;

use chrono_tz::Tz;
use lifeplan_db::{Record, RecordStore, StoreError};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::enrich::{EnrichmentDispatcher, EnrichmentEvent};
use crate::error::PipelineError;
use crate::intent::{ItemPayload, ItemType};
use crate::schema::{self, ValidationError};
use crate::timezone;

/// A stored item plus the enrichment task it triggered, if any.
#[derive(Debug)]
pub struct CreatedItem {
    pub item_type: ItemType,
    pub item: Record,
    pub message: String,
    /// Never awaited on the request path.
    pub enrichment: Option<JoinHandle<()>>,
}

pub struct ActionExecutor {
    store: Arc<dyn RecordStore>,
    enrichment: EnrichmentDispatcher,
    timezone: Tz,
}

impl ActionExecutor {
    pub fn new(store: Arc<dyn RecordStore>, enrichment: EnrichmentDispatcher, timezone: Tz) -> Self {
        Self {
            store,
            enrichment,
            timezone,
        }
    }

    /// Normalize dates, re-validate, and insert one record.
    pub async fn create(
        &self,
        user_id: &str,
        payload: ItemPayload,
    ) -> Result<CreatedItem, PipelineError> {
        let ItemPayload {
            item_type,
            mut fields,
        } = payload;

        schema::validate(&Value::Object(fields.clone()), item_type.schema())?;
        normalize_dates(&mut fields, item_type, self.timezone);
        apply_defaults(&mut fields, item_type);
        // A dropped date may have been required.
        check_required(&fields, item_type)?;

        let collection = item_type.collection();
        let item = self
            .store
            .insert(collection, user_id, vec![fields])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected {
                collection,
                reason: "insert returned no rows".into(),
            })?;

        let id = item.get("id").and_then(Value::as_str).unwrap_or_default();
        info!(user_id, %collection, id, "item created");

        let enrichment = match item_type {
            ItemType::Grocery => EnrichmentEvent::from_record(&item)
                .and_then(|event| self.enrichment.emit(event)),
            _ => None,
        };

        Ok(CreatedItem {
            item_type,
            message: creation_message(item_type, &item),
            item,
            enrichment,
        })
    }
}

/// Normalize every date-bearing field of `item_type`. Unparseable values
/// are dropped with a warning; the rest of the record survives.
pub fn normalize_dates(fields: &mut Record, item_type: ItemType, tz: Tz) {
    for rule in item_type.date_rules() {
        let Some(raw) = fields.remove(rule.source) else {
            continue;
        };
        let Some(expr) = raw.as_str() else {
            if !raw.is_null() {
                warn!(field = rule.source, value = %raw, "dropping non-string date field");
            }
            continue;
        };
        match timezone::normalize(expr, tz) {
            Ok(n) => {
                fields.insert(rule.target.into(), Value::String(n.utc.clone()));
                fields.insert(format!("{}_utc", rule.target), Value::String(n.utc));
                fields.insert(format!("{}_local", rule.target), Value::String(n.local));
                fields.insert("timezone".into(), Value::String(n.timezone));
            }
            Err(e) => warn!(field = rule.source, error = %e, "dropping unparseable date field"),
        }
    }
}

/// Every required field must survive normalization.
fn check_required(fields: &Record, item_type: ItemType) -> Result<(), ValidationError> {
    let schema = item_type.schema();
    for spec in schema.required_fields() {
        if fields.get(spec.name).is_none_or(Value::is_null) {
            return Err(ValidationError::MissingField {
                context: schema.name.to_owned(),
                field: spec.name,
            });
        }
    }
    Ok(())
}

fn apply_defaults(fields: &mut Record, item_type: ItemType) {
    match item_type {
        ItemType::Grocery => {
            fields.entry("bought").or_insert(Value::Bool(false));
        }
        ItemType::Task => {
            fields
                .entry("status")
                .or_insert_with(|| Value::String("Inbox".into()));
        }
        _ => {}
    }
}

/// `Successfully created <type>: <label>`.
pub fn creation_message(item_type: ItemType, item: &Record) -> String {
    let label = ["title", "item_name", "message", "description", "category"]
        .iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or("item");
    format!("Successfully created {item_type}: {label}")
}
