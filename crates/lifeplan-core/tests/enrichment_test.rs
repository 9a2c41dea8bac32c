//! Integration tests for grocery nutrition enrichment, in-process and via
//! the request entry point.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use lifeplan_core::enrich::{EnrichmentDispatcher, EnrichmentError, InProcessEnrichmentSink};
use lifeplan_core::executor::ActionExecutor;
use lifeplan_core::intent::{ItemPayload, ItemType};
use lifeplan_core::nutrition::{NutritionEnricher, NutritionFacts, NutritionLookup};
use lifeplan_core::{Agent, PipelineError};
use lifeplan_db::Collection;
use lifeplan_test_utils::MemoryStore;

use common::{ScriptedModel, services};

struct Catalog;

#[async_trait]
impl NutritionLookup for Catalog {
    async fn lookup(&self, item_name: &str) -> Result<Option<NutritionFacts>, EnrichmentError> {
        match item_name {
            "Oats" => Ok(Some(NutritionFacts {
                calories: 389.0,
                serving_size_g: Some(100.0),
                protein_g: 16.9,
                ..Default::default()
            })),
            "Banana" => Ok(Some(NutritionFacts {
                calories: 105.0,
                serving_size_g: Some(118.0),
                ..Default::default()
            })),
            "Broken" => Err(EnrichmentError::Lookup("HTTP 502".into())),
            _ => Ok(None),
        }
    }
}

#[tokio::test]
async fn created_grocery_is_enriched_in_process() {
    let store = Arc::new(MemoryStore::new());
    let enricher = Arc::new(NutritionEnricher::new(store.clone(), Arc::new(Catalog)));
    let dispatcher = EnrichmentDispatcher::new(
        Arc::new(InProcessEnrichmentSink::new(enricher)),
        Duration::from_secs(5),
    );
    let executor = ActionExecutor::new(store.clone(), dispatcher, chrono_tz::Asia::Kolkata);

    let created = executor
        .create(
            "u-1",
            ItemPayload {
                item_type: ItemType::Grocery,
                fields: json!({ "item_name": "Banana", "quantity": 6, "unit": "pcs" })
                    .as_object()
                    .unwrap()
                    .clone(),
            },
        )
        .await
        .unwrap();

    // The response carries the plain record; enrichment lands afterwards.
    assert!(!created.item.contains_key("calories"));
    created.enrichment.unwrap().await.unwrap();

    let stored = &store.rows(Collection::Groceries)[0];
    assert_eq!(stored["calories"], 630);
}

fn agent_with_nutrition(store: Arc<MemoryStore>) -> Agent {
    let enricher = Arc::new(NutritionEnricher::new(store.clone(), Arc::new(Catalog)));
    Agent::new(Arc::new(
        services(store, ScriptedModel::new()).with_nutrition(enricher),
    ))
}

#[tokio::test]
async fn enrichment_request_scales_by_grams() {
    let store = Arc::new(MemoryStore::new());
    let rows = store.seed(
        Collection::Groceries,
        "u-1",
        vec![json!({ "item_name": "Oats", "quantity": 1, "unit": "kg", "bought": false })],
    );
    let agent = agent_with_nutrition(store.clone());

    let outcome = agent
        .enrich_grocery(&json!({
            "item_name": "Oats",
            "quantity": 1,
            "unit": "kg",
            "grocery_id": rows[0]["id"],
            "user_id": "u-1"
        }))
        .await
        .unwrap();
    assert!(outcome.enriched);
    assert_eq!(outcome.record["calories"], 3890);
    assert_eq!(outcome.record["protein_g"], 169.0);
}

#[tokio::test]
async fn lookup_failure_returns_record_unmodified() {
    let store = Arc::new(MemoryStore::new());
    let rows = store.seed(
        Collection::Groceries,
        "u-1",
        vec![json!({ "item_name": "Broken", "quantity": 1, "unit": "pc" })],
    );
    let agent = agent_with_nutrition(store);

    let outcome = agent
        .enrich_grocery(&json!({
            "item_name": "Broken",
            "quantity": 1,
            "unit": "pc",
            "grocery_id": rows[0]["id"],
            "user_id": "u-1"
        }))
        .await
        .unwrap();
    assert!(!outcome.enriched);
    assert_eq!(outcome.message, "Could not fetch nutrition data for Broken.");
    assert_eq!(outcome.record["item_name"], "Broken");
}

#[tokio::test]
async fn missing_fields_are_a_client_error() {
    let agent = agent_with_nutrition(Arc::new(MemoryStore::new()));
    let err = agent
        .enrich_grocery(&json!({ "item_name": "Oats" }))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ClientInput(_)));
    assert_eq!(
        err.to_string(),
        "missing required fields: quantity, unit, grocery_id, user_id"
    );
}

#[tokio::test]
async fn unknown_grocery_is_not_found() {
    let agent = agent_with_nutrition(Arc::new(MemoryStore::new()));
    let err = agent
        .enrich_grocery(&json!({
            "item_name": "Oats",
            "quantity": 100,
            "unit": "g",
            "grocery_id": "00000000-0000-0000-0000-000000000000",
            "user_id": "u-1"
        }))
        .await
        .unwrap_err();
    assert_eq!(err.status_class().http_status(), 404);
}

#[tokio::test]
async fn without_nutrition_key_record_comes_back_unmodified() {
    let store = Arc::new(MemoryStore::new());
    let rows = store.seed(
        Collection::Groceries,
        "u-1",
        vec![json!({ "item_name": "Oats", "quantity": 1, "unit": "kg" })],
    );
    let agent = Agent::new(Arc::new(services(store, ScriptedModel::new())));

    let outcome = agent
        .enrich_grocery(&json!({
            "item_name": "Oats",
            "quantity": 1,
            "unit": "kg",
            "grocery_id": rows[0]["id"],
            "user_id": "u-1"
        }))
        .await
        .unwrap();
    assert!(!outcome.enriched);
    assert_eq!(outcome.message, "Grocery item added (nutrition enrichment unavailable)");
    assert!(!outcome.record.contains_key("calories"));
}
