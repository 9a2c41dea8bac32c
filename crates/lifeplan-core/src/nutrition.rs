//! Nutrition lookup and scaling for grocery records.

use std::sync::Arc;

use async_trait::async_trait;
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::enrich::{EnrichmentError, EnrichmentEvent};

pub const DEFAULT_BASE_URL: &str = "https://api.api-ninjas.com/v1/nutrition";

/// Serving size assumed when the service omits one (or reports zero).
const DEFAULT_SERVING_G: f64 = 100.0;

/// Per-serving facts for one food. Non-numeric values (e.g. premium-only
/// placeholders) read as zero.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NutritionFacts {
    #[serde(default, deserialize_with = "lenient")]
    pub calories: f64,
    #[serde(default, deserialize_with = "lenient_opt")]
    pub serving_size_g: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub protein_g: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub fat_total_g: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub carbohydrates_total_g: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub sugar_g: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub fiber_g: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub cholesterol_mg: f64,
    #[serde(default, deserialize_with = "lenient")]
    pub sodium_mg: f64,
}

fn lenient<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(Value::deserialize(d)?.as_f64().unwrap_or(0.0))
}

fn lenient_opt<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(Value::deserialize(d)?.as_f64())
}

/// Scale per-serving facts to the stored quantity.
///
/// Piece units multiply by the piece count. Everything else is converted to
/// grams (`kg` x1000, other units taken as grams) and scaled per gram.
pub fn scale(facts: &NutritionFacts, quantity: f64, unit: &str) -> Record {
    let unit = unit.trim().to_lowercase();
    let factor = if matches!(unit.as_str(), "pc" | "pcs" | "piece" | "pieces") {
        quantity
    } else {
        let serving = facts
            .serving_size_g
            .filter(|s| *s > 0.0)
            .unwrap_or(DEFAULT_SERVING_G);
        let grams = if unit == "kg" { quantity * 1000.0 } else { quantity };
        grams / serving
    };

    let whole = |v: f64| json!((v * factor).round() as i64);
    let tenth = |v: f64| json!(((v * factor) * 10.0).round() / 10.0);

    let mut out = Record::new();
    out.insert("calories".into(), whole(facts.calories));
    out.insert("protein_g".into(), tenth(facts.protein_g));
    out.insert("fat_total_g".into(), tenth(facts.fat_total_g));
    out.insert("carbohydrates_total_g".into(), tenth(facts.carbohydrates_total_g));
    out.insert("sugar_g".into(), tenth(facts.sugar_g));
    out.insert("fiber_g".into(), tenth(facts.fiber_g));
    out.insert("cholesterol_mg".into(), whole(facts.cholesterol_mg));
    out.insert("sodium_mg".into(), whole(facts.sodium_mg));
    out
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NutritionLookup: Send + Sync {
    /// Facts for `item_name`, or `None` if the service knows no such food.
    async fn lookup(&self, item_name: &str) -> Result<Option<NutritionFacts>, EnrichmentError>;
}

/// API-Ninjas style nutrition service: `GET {base}?query=<item>` with an
/// `X-Api-Key` header, answering with an array of facts (or an object with
/// an `items` array).
pub struct ApiNinjasLookup {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ApiNinjasLookup {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl NutritionLookup for ApiNinjasLookup {
    async fn lookup(&self, item_name: &str) -> Result<Option<NutritionFacts>, EnrichmentError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("query", item_name)])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| EnrichmentError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Lookup(format!("HTTP {status}: {body}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| EnrichmentError::Lookup(e.to_string()))?;
        let first = match body {
            Value::Array(items) => items.into_iter().next(),
            Value::Object(mut obj) => match obj.remove("items") {
                Some(Value::Array(items)) => items.into_iter().next(),
                _ => None,
            },
            _ => None,
        };
        first
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| EnrichmentError::Lookup(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Enricher
// ---------------------------------------------------------------------------

/// Result of enriching one grocery record.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentOutcome {
    /// The record after the update, or unmodified when no facts were found.
    pub record: Record,
    pub message: String,
    pub enriched: bool,
}

/// Looks an item up and writes scaled facts onto its grocery record.
pub struct NutritionEnricher {
    store: Arc<dyn RecordStore>,
    lookup: Arc<dyn NutritionLookup>,
}

impl NutritionEnricher {
    pub fn new(store: Arc<dyn RecordStore>, lookup: Arc<dyn NutritionLookup>) -> Self {
        Self { store, lookup }
    }

    pub async fn enrich(&self, event: &EnrichmentEvent) -> Result<EnrichmentOutcome, EnrichmentError> {
        let facts = match self.lookup.lookup(&event.item_name).await {
            Ok(Some(facts)) => facts,
            Ok(None) => {
                info!(item = %event.item_name, "no nutrition data found");
                return self
                    .unmodified(event, format!("No nutrition data found for {}.", event.item_name))
                    .await;
            }
            Err(e) => {
                warn!(item = %event.item_name, error = %e, "nutrition lookup failed");
                return self
                    .unmodified(
                        event,
                        format!("Could not fetch nutrition data for {}.", event.item_name),
                    )
                    .await;
            }
        };

        let patch = scale(&facts, event.quantity, &event.unit);
        let updated = self
            .store
            .update(Collection::Groceries, &event.user_id, &event.grocery_id, patch)
            .await?
            .ok_or_else(|| EnrichmentError::RecordNotFound {
                grocery_id: event.grocery_id.clone(),
            })?;

        info!(grocery_id = %event.grocery_id, item = %event.item_name, "grocery enriched");
        Ok(EnrichmentOutcome {
            record: updated,
            message: format!("Enriched {} with nutrition data.", event.item_name),
            enriched: true,
        })
    }

    async fn unmodified(
        &self,
        event: &EnrichmentEvent,
        message: String,
    ) -> Result<EnrichmentOutcome, EnrichmentError> {
        let record = self
            .store
            .select(
                Collection::Groceries,
                &RecordQuery::owned_by(&event.user_id).filter("id", event.grocery_id.as_str()),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EnrichmentError::RecordNotFound {
                grocery_id: event.grocery_id.clone(),
            })?;
        Ok(EnrichmentOutcome {
            record,
            message,
            enriched: false,
        })
    }
}
