//! Request entry point: one free-text message in, one response envelope out.

use std::sync::Arc;

use lifeplan_db::{Collection, RecordQuery};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::context::gather_context;
use crate::dispatch::{Dispatcher, synthesize_plan_envelope};
use crate::enrich::{EnrichmentError, EnrichmentEvent};
use crate::error::PipelineError;
use crate::executor::ActionExecutor;
use crate::extract::{Container, extract};
use crate::grocery::GroceryPlanGenerator;
use crate::learning::LearningPlanEngine;
use crate::model::GenerationRequest;
use crate::nutrition::EnrichmentOutcome;
use crate::prompt;
use crate::response::AgentResponse;
use crate::services::Services;
use crate::timezone;

/// Explicit intent that skips classification and builds a grocery plan.
pub const GROCERY_PLAN_INTENT: &str = "generate_grocery_plan";

/// Body of an agent request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentRequest {
    #[serde(rename = "userInput", default)]
    pub user_input: Option<String>,
    #[serde(rename = "userId", default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub plan_details: Option<Value>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(rename = "activeGoal", default)]
    pub active_goal: Option<Value>,
}

pub struct Agent {
    services: Arc<Services>,
    dispatcher: Dispatcher,
    learning: Arc<LearningPlanEngine>,
    grocery: GroceryPlanGenerator,
}

impl Agent {
    pub fn new(services: Arc<Services>) -> Self {
        let executor = Arc::new(ActionExecutor::new(
            services.store.clone(),
            services.enrichment.clone(),
            services.timezone,
        ));
        let learning = Arc::new(LearningPlanEngine::new(
            services.store.clone(),
            services.chain.clone(),
            services.clock.clone(),
            services.timezone,
        ));
        let grocery = GroceryPlanGenerator::new(
            services.store.clone(),
            services.chain.clone(),
            services.enrichment.clone(),
            services.clock.clone(),
            services.timezone,
        );
        Self {
            dispatcher: Dispatcher::new(executor, learning.clone()),
            learning,
            grocery,
            services,
        }
    }

    pub async fn handle(&self, request: AgentRequest) -> Result<AgentResponse, PipelineError> {
        let user_id = non_empty(request.user_id.as_deref())
            .ok_or_else(|| PipelineError::ClientInput("Missing userId.".into()))?;

        if let Some(envelope) = synthesize_plan_envelope(request.plan_details.as_ref())? {
            info!(user_id, "routing plan details directly");
            return self.dispatcher.dispatch(user_id, envelope).await;
        }

        let user_input = non_empty(request.user_input.as_deref())
            .ok_or_else(|| PipelineError::ClientInput("Missing userInput or userId.".into()))?;

        if request.intent.as_deref() == Some(GROCERY_PLAN_INTENT) {
            let plan = self
                .grocery
                .generate(user_id, user_input, request.active_goal.as_ref())
                .await?;
            return Ok(plan.into());
        }

        let context = gather_context(self.services.store.as_ref(), user_id).await;
        let now = timezone::now_in(self.services.timezone, self.services.clock.as_ref());
        let prompt = prompt::classification_prompt(
            &context,
            user_input,
            &prompt::today_label(&now),
            self.services.timezone.name(),
        );

        let reply = self
            .services
            .chain
            .invoke(&GenerationRequest::new(prompt).with_temperature(0.2))
            .await?;
        let payload = extract(&reply.text, Container::Object)?;
        self.dispatcher.dispatch_raw(user_id, payload).await
    }

    /// Like [`Agent::handle`], but failures become the error envelope.
    pub async fn respond(&self, request: AgentRequest) -> AgentResponse {
        match self.handle(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "request failed");
                AgentResponse::error(&e)
            }
        }
    }

    pub async fn extend_plan(
        &self,
        user_id: &str,
        plan_id: &str,
        additional_weeks: i64,
    ) -> Result<AgentResponse, PipelineError> {
        Ok(self
            .learning
            .extend(user_id, plan_id, additional_weeks)
            .await?
            .into())
    }

    /// Enrich one grocery record from an inbound request body.
    pub async fn enrich_grocery(&self, body: &Value) -> Result<EnrichmentOutcome, PipelineError> {
        let event = EnrichmentEvent::from_request(body).map_err(|e| match e {
            EnrichmentError::MissingFields(_) => PipelineError::ClientInput(e.to_string()),
            other => other.into(),
        })?;
        if let Some(enricher) = &self.services.nutrition {
            return Ok(enricher.enrich(&event).await?);
        }

        let record = self
            .services
            .store
            .select(
                Collection::Groceries,
                &RecordQuery::owned_by(&event.user_id)
                    .filter("id", event.grocery_id.as_str())
                    .limit(1),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EnrichmentError::RecordNotFound {
                grocery_id: event.grocery_id.clone(),
            })?;
        Ok(EnrichmentOutcome {
            record,
            message: "Grocery item added (nutrition enrichment unavailable)".into(),
            enriched: false,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}
