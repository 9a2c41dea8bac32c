//! Fire-and-forget nutrition enrichment events.
//!
//! Creating a grocery record emits an [`EnrichmentEvent`]. The
//! [`EnrichmentDispatcher`] hands it to a sink on a spawned task with its
//! own timeout; the creating request never waits on it and never sees its
//! failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lifeplan_db::{Record, StoreError};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::nutrition::NutritionEnricher;

#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("grocery {grocery_id} not found")]
    RecordNotFound { grocery_id: String },

    #[error("nutrition lookup failed: {0}")]
    Lookup(String),

    #[error("enrichment delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A request to attach nutrition facts to one grocery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentEvent {
    pub item_name: String,
    pub quantity: f64,
    pub unit: String,
    pub grocery_id: String,
    pub user_id: String,
}

impl EnrichmentEvent {
    /// Build from a freshly stored grocery record.
    pub fn from_record(record: &Record) -> Option<Self> {
        Some(Self {
            item_name: record.get("item_name")?.as_str()?.to_owned(),
            quantity: record.get("quantity").and_then(Value::as_f64).unwrap_or(1.0),
            unit: record
                .get("unit")
                .and_then(Value::as_str)
                .unwrap_or("piece")
                .to_owned(),
            grocery_id: record.get("id")?.as_str()?.to_owned(),
            user_id: record.get("user_id")?.as_str()?.to_owned(),
        })
    }

    /// Build from an inbound request body. Every missing field is named.
    pub fn from_request(body: &Value) -> Result<Self, EnrichmentError> {
        let text = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let item_name = text("item_name");
        let quantity = body.get("quantity").and_then(Value::as_f64);
        let unit = text("unit");
        let grocery_id = text("grocery_id");
        let user_id = text("user_id");

        let mut missing = Vec::new();
        for (name, present) in [
            ("item_name", item_name.is_some()),
            ("quantity", quantity.is_some()),
            ("unit", unit.is_some()),
            ("grocery_id", grocery_id.is_some()),
            ("user_id", user_id.is_some()),
        ] {
            if !present {
                missing.push(name);
            }
        }

        match (item_name, quantity, unit, grocery_id, user_id) {
            (Some(item_name), Some(quantity), Some(unit), Some(grocery_id), Some(user_id)) => {
                Ok(Self {
                    item_name,
                    quantity,
                    unit,
                    grocery_id,
                    user_id,
                })
            }
            _ => Err(EnrichmentError::MissingFields(missing)),
        }
    }
}

/// Where enrichment events are delivered.
#[async_trait]
pub trait EnrichmentSink: Send + Sync {
    async fn deliver(&self, event: EnrichmentEvent) -> Result<(), EnrichmentError>;
}

/// Posts events to an enrichment endpoint (e.g. another instance's
/// `/api/enrich-grocery-item`).
pub struct HttpEnrichmentSink {
    client: Client,
    url: String,
}

impl HttpEnrichmentSink {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl EnrichmentSink for HttpEnrichmentSink {
    async fn deliver(&self, event: EnrichmentEvent) -> Result<(), EnrichmentError> {
        let response = self
            .client
            .post(&self.url)
            .json(&event)
            .send()
            .await
            .map_err(|e| EnrichmentError::Delivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(EnrichmentError::Delivery(format!(
                "{} returned {}",
                self.url,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Runs the enrichment routine in this process.
pub struct InProcessEnrichmentSink {
    enricher: Arc<NutritionEnricher>,
}

impl InProcessEnrichmentSink {
    pub fn new(enricher: Arc<NutritionEnricher>) -> Self {
        Self { enricher }
    }
}

#[async_trait]
impl EnrichmentSink for InProcessEnrichmentSink {
    async fn deliver(&self, event: EnrichmentEvent) -> Result<(), EnrichmentError> {
        let outcome = self.enricher.enrich(&event).await?;
        debug!(grocery_id = %event.grocery_id, message = %outcome.message, "enrichment finished");
        Ok(())
    }
}

/// Spawns best-effort deliveries.
#[derive(Clone)]
pub struct EnrichmentDispatcher {
    sink: Option<Arc<dyn EnrichmentSink>>,
    timeout: Duration,
}

impl EnrichmentDispatcher {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(sink: Arc<dyn EnrichmentSink>, timeout: Duration) -> Self {
        Self {
            sink: Some(sink),
            timeout,
        }
    }

    /// A dispatcher that drops every event.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Launch delivery of `event` without waiting for it.
    ///
    /// The returned handle is only for callers that want to observe
    /// completion (tests, shutdown); the task never fails.
    pub fn emit(&self, event: EnrichmentEvent) -> Option<JoinHandle<()>> {
        let sink = self.sink.clone()?;
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            let grocery_id = event.grocery_id.clone();
            match tokio::time::timeout(timeout, sink.deliver(event)).await {
                Ok(Ok(())) => debug!(%grocery_id, "enrichment delivered"),
                Ok(Err(e)) => warn!(%grocery_id, error = %e, "enrichment failed"),
                Err(_) => warn!(%grocery_id, ?timeout, "enrichment timed out"),
            }
        }))
    }
}
