//! Routes a validated intent to its handler.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::PipelineError;
use crate::executor::ActionExecutor;
use crate::intent::{IntentEnvelope, PlanRequest};
use crate::learning::LearningPlanEngine;
use crate::response::AgentResponse;

const EMPTY_ANALYSIS: &str = "I couldn't find enough data to analyze yet.";

/// Build a `generate_learning_plan` envelope from caller-supplied plan
/// parameters. `None` unless the details name a topic; details that name a
/// topic but fail validation are a client error.
pub fn synthesize_plan_envelope(
    plan_details: Option<&Value>,
) -> Result<Option<IntentEnvelope>, PipelineError> {
    let Some(details) = plan_details else {
        return Ok(None);
    };
    let has_topic = details
        .get("topic")
        .and_then(Value::as_str)
        .is_some_and(|t| !t.trim().is_empty());
    if !has_topic {
        return Ok(None);
    }
    let request = PlanRequest::from_details(details)
        .map_err(|e| PipelineError::ClientInput(format!("Invalid plan_details: {e}")))?;
    Ok(Some(IntentEnvelope::GenerateLearningPlan(request)))
}

pub struct Dispatcher {
    executor: Arc<ActionExecutor>,
    learning: Arc<LearningPlanEngine>,
}

impl Dispatcher {
    pub fn new(executor: Arc<ActionExecutor>, learning: Arc<LearningPlanEngine>) -> Self {
        Self { executor, learning }
    }

    /// Parse a raw model payload, then dispatch it.
    pub async fn dispatch_raw(
        &self,
        user_id: &str,
        payload: Value,
    ) -> Result<AgentResponse, PipelineError> {
        let envelope = IntentEnvelope::from_value(payload)?;
        self.dispatch(user_id, envelope).await
    }

    pub async fn dispatch(
        &self,
        user_id: &str,
        envelope: IntentEnvelope,
    ) -> Result<AgentResponse, PipelineError> {
        info!(user_id, intent = %envelope.intent(), "dispatching");
        match envelope {
            IntentEnvelope::CreateItem(payload) => {
                Ok(self.executor.create(user_id, payload).await?.into())
            }
            IntentEnvelope::GenerateLearningPlan(request) => {
                Ok(self.learning.create(user_id, &request).await?.into())
            }
            IntentEnvelope::AnalyzeData {
                analysis_type,
                data,
            } => Ok(AgentResponse::Answer {
                text: analysis_text(&analysis_type, &data),
            }),
            IntentEnvelope::AnswerQuestion { answer } => Ok(AgentResponse::Answer { text: answer }),
        }
    }
}

fn analysis_text(analysis_type: &str, data: &Value) -> String {
    let empty = match data {
        Value::Null => true,
        Value::Object(o) => o.is_empty(),
        _ => false,
    };
    match data {
        _ if empty => EMPTY_ANALYSIS.to_owned(),
        other if analysis_type.is_empty() => other.to_string(),
        other => format!("{analysis_type} analysis: {other}"),
    }
}
