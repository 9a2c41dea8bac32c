//! The dependency bundle shared by every request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono_tz::Tz;
use lifeplan_db::RecordStore;
use reqwest::Client;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::enrich::{EnrichmentDispatcher, HttpEnrichmentSink, InProcessEnrichmentSink};
use crate::model::{ChainBudget, LanguageModel, ModelChain, OpenAiCompatModel};
use crate::nutrition::{self, ApiNinjasLookup, NutritionEnricher};

pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_PRIMARY_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_FALLBACK_MODEL: &str = "llama-3.1-8b-instant";

/// Everything needed to build [`Services`], already resolved.
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub timezone: Tz,
    pub model_base_url: String,
    pub model_api_key: Option<String>,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub budget: ChainBudget,
    pub nutrition_base_url: String,
    pub nutrition_api_key: Option<String>,
    /// Deliver enrichment events over HTTP instead of in-process.
    pub enrichment_url: Option<String>,
    pub enrichment_timeout: Duration,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Kolkata,
            model_base_url: DEFAULT_MODEL_BASE_URL.to_owned(),
            model_api_key: None,
            primary_model: DEFAULT_PRIMARY_MODEL.to_owned(),
            fallback_model: Some(DEFAULT_FALLBACK_MODEL.to_owned()),
            budget: ChainBudget::default(),
            nutrition_base_url: nutrition::DEFAULT_BASE_URL.to_owned(),
            nutrition_api_key: None,
            enrichment_url: None,
            enrichment_timeout: EnrichmentDispatcher::DEFAULT_TIMEOUT,
        }
    }
}

pub struct Services {
    pub store: Arc<dyn RecordStore>,
    pub chain: Arc<ModelChain>,
    pub clock: Arc<dyn Clock>,
    pub timezone: Tz,
    pub enrichment: EnrichmentDispatcher,
    /// Present when a nutrition API key is configured.
    pub nutrition: Option<Arc<NutritionEnricher>>,
}

impl Services {
    /// Bundle with enrichment disabled.
    pub fn new(
        store: Arc<dyn RecordStore>,
        chain: Arc<ModelChain>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            chain,
            clock,
            timezone,
            enrichment: EnrichmentDispatcher::disabled(),
            nutrition: None,
        }
    }

    pub fn with_enrichment(mut self, enrichment: EnrichmentDispatcher) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn with_nutrition(mut self, enricher: Arc<NutritionEnricher>) -> Self {
        self.nutrition = Some(enricher);
        self
    }

    /// Build the production bundle over `store`.
    pub fn build(config: &ServicesConfig, store: Arc<dyn RecordStore>) -> anyhow::Result<Self> {
        let Some(api_key) = config.model_api_key.clone().filter(|k| !k.trim().is_empty()) else {
            bail!("model API key is not configured (set GROQ_API_KEY or [model] api_key)");
        };

        let client = Client::builder()
            .build()
            .context("failed to build HTTP client")?;

        let primary: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatModel::with_client(
            client.clone(),
            &config.model_base_url,
            &config.primary_model,
            Some(api_key.clone()),
        ));
        let fallback = config.fallback_model.as_ref().map(|name| {
            Arc::new(OpenAiCompatModel::with_client(
                client.clone(),
                &config.model_base_url,
                name,
                Some(api_key.clone()),
            )) as Arc<dyn LanguageModel>
        });
        let chain = Arc::new(ModelChain::new(primary, fallback, config.budget));

        let nutrition = config.nutrition_api_key.as_ref().map(|key| {
            let lookup = ApiNinjasLookup::new(client.clone(), &config.nutrition_base_url, key);
            Arc::new(NutritionEnricher::new(store.clone(), Arc::new(lookup)))
        });

        let enrichment = match (&config.enrichment_url, &nutrition) {
            (Some(url), _) => {
                info!(%url, "enrichment events delivered over HTTP");
                EnrichmentDispatcher::new(
                    Arc::new(HttpEnrichmentSink::new(client, url)),
                    config.enrichment_timeout,
                )
            }
            (None, Some(enricher)) => {
                info!("enrichment events handled in-process");
                EnrichmentDispatcher::new(
                    Arc::new(InProcessEnrichmentSink::new(enricher.clone())),
                    config.enrichment_timeout,
                )
            }
            (None, None) => {
                info!("nutrition enrichment disabled");
                EnrichmentDispatcher::disabled()
            }
        };

        info!(
            primary = %config.primary_model,
            fallback = config.fallback_model.as_deref().unwrap_or("none"),
            timezone = %config.timezone,
            "services ready"
        );
        Ok(Self {
            store,
            chain,
            clock: Arc::new(SystemClock),
            timezone: config.timezone,
            enrichment,
            nutrition,
        })
    }
}
