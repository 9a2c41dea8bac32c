//! Week-long grocery plans, optionally shaped by the user's active goal.

use std::sync::Arc;

use chrono_tz::Tz;
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::enrich::{EnrichmentDispatcher, EnrichmentEvent};
use crate::error::PipelineError;
use crate::extract::{Container, extract};
use crate::model::{GenerationRequest, ModelChain};
use crate::prompt;
use crate::schema::{self, GROCERY_PLAN_ITEM, ValidationError};
use crate::timezone;

const CURRENT_GROCERY_LIMIT: i64 = 5;
const GENERAL_HEALTH: &str = "general health";

/// What a grocery plan is optimized for.
#[derive(Debug, Clone, PartialEq)]
pub struct GroceryFocus {
    /// e.g. `"muscle gain"`, `"budget eating"`.
    pub label: String,
    pub goal_id: Option<Value>,
    pub goal: Option<Value>,
}

impl GroceryFocus {
    /// Prompt paragraph describing the focus.
    pub fn context_text(&self) -> String {
        let Some(goal) = &self.goal else {
            return format!(
                "The user is asking for a grocery plan with a focus on {}.",
                self.label
            );
        };
        let text = |key: &str, default: &str| -> String {
            match goal.get(key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => default.to_owned(),
                Some(other) => other.to_string(),
            }
        };
        let metadata = goal.get("metadata").cloned().unwrap_or_else(|| json!({}));
        format!(
            "USER'S ACTIVE GOAL:\n\
             - Goal Type: {}\n\
             - Goal Title: {}\n\
             - Target: {} {}\n\
             - Metadata: {metadata}",
            self.label,
            text("title", "Unknown Goal"),
            text("target_value", "Not specified"),
            text("target_unit", ""),
        )
    }

    /// Focus-specific shopping advice, when there is any.
    pub fn advice(&self) -> Option<&'static str> {
        match self.label.as_str() {
            "weight loss" => Some(
                "For weight loss: Focus on low-calorie, high-fiber, high-protein foods. \
                 Include plenty of vegetables, lean proteins, and whole grains.",
            ),
            "muscle gain" => Some(
                "For muscle gain: Emphasize high-protein foods, complex carbs, and healthy \
                 fats. Include paneer, dal, quinoa, nuts.",
            ),
            "budget eating" => Some(
                "For budget eating: Focus on cost-effective staples like rice, dal, seasonal \
                 vegetables, and affordable proteins.",
            ),
            _ => None,
        }
    }
}

/// Take the focus from an active goal carrying an `id`, otherwise infer it
/// from keywords in the request.
pub fn infer_focus(user_input: &str, active_goal: Option<&Value>) -> GroceryFocus {
    if let Some(goal) = active_goal {
        if let Some(id) = goal.get("id").filter(|id| !id.is_null()) {
            let label = goal
                .get("goal_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .replace('_', " ");
            return GroceryFocus {
                label,
                goal_id: Some(id.clone()),
                goal: Some(goal.clone()),
            };
        }
    }

    let lower = user_input.to_lowercase();
    let label = if lower.contains("muscle building") || lower.contains("muscle gain") {
        "muscle gain"
    } else if lower.contains("weight loss") {
        "weight loss"
    } else if lower.contains("budget") || lower.contains("affordable") {
        "budget eating"
    } else {
        GENERAL_HEALTH
    };
    GroceryFocus {
        label: label.to_owned(),
        goal_id: None,
        goal: None,
    }
}

/// A stored grocery plan.
#[derive(Debug)]
pub struct GroceryPlan {
    pub goal_type: String,
    pub items: Vec<Record>,
    pub estimated_total_cost: f64,
    pub message: String,
    /// One handle per item whose enrichment was launched.
    pub enrichment: Vec<JoinHandle<()>>,
}

pub struct GroceryPlanGenerator {
    store: Arc<dyn RecordStore>,
    chain: Arc<ModelChain>,
    enrichment: EnrichmentDispatcher,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl GroceryPlanGenerator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        chain: Arc<ModelChain>,
        enrichment: EnrichmentDispatcher,
        clock: Arc<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            chain,
            enrichment,
            clock,
            timezone,
        }
    }

    pub async fn generate(
        &self,
        user_id: &str,
        user_input: &str,
        active_goal: Option<&Value>,
    ) -> Result<GroceryPlan, PipelineError> {
        let focus = infer_focus(user_input, active_goal);
        let current = self.current_groceries(user_id).await;
        let today = prompt::today_label(&timezone::now_in(self.timezone, self.clock.as_ref()));

        info!(user_id, focus = %focus.label, "generating grocery plan");
        let request =
            GenerationRequest::new(prompt::grocery_prompt(&focus, &current, user_input, &today))
                .with_temperature(0.3);
        let reply = self.chain.invoke(&request).await?;

        let mut parsed = extract(&reply.text, Container::Object)?;
        let list = parsed
            .get_mut("grocery_plan")
            .map(Value::take)
            .ok_or_else(|| ValidationError::MissingField {
                context: "grocery plan".into(),
                field: "grocery_plan",
            })?;
        schema::validate_each(&list, &GROCERY_PLAN_ITEM)?;
        let Value::Array(planned) = list else {
            return Err(ValidationError::NotAnArray {
                context: "grocery plan".into(),
            }
            .into());
        };

        let estimated_total_cost: f64 = planned
            .iter()
            .filter_map(|item| item.get("estimated_price").and_then(Value::as_f64))
            .sum();
        let rows: Vec<Record> = planned.iter().map(|item| to_row(item, &focus)).collect();

        let items = self
            .store
            .insert(Collection::Groceries, user_id, rows)
            .await?;
        let enrichment = items
            .iter()
            .filter_map(EnrichmentEvent::from_record)
            .filter_map(|event| self.enrichment.emit(event))
            .collect();

        let message = if focus.goal.is_some() {
            format!(
                "Generated a personalized grocery plan for your {} goal! Added {} items with \
                 estimated cost of ₹{estimated_total_cost:.2}. The plan includes nutritionally \
                 balanced foods to help you achieve your target.",
                focus.label,
                items.len()
            )
        } else {
            format!(
                "Generated a grocery plan focusing on {}! Added {} items with estimated cost \
                 of ₹{estimated_total_cost:.2}. The plan includes nutritionally balanced foods.",
                focus.label,
                items.len()
            )
        };

        info!(user_id, items = items.len(), estimated_total_cost, "grocery plan stored");
        Ok(GroceryPlan {
            goal_type: focus.label,
            items,
            estimated_total_cost,
            message,
            enrichment,
        })
    }

    async fn current_groceries(&self, user_id: &str) -> Vec<Value> {
        let query = RecordQuery::owned_by(user_id)
            .filter("bought", false)
            .limit(CURRENT_GROCERY_LIMIT);
        match self.store.select(Collection::Groceries, &query).await {
            Ok(rows) => rows
                .into_iter()
                .map(|row| {
                    let projected: Record = ["item_name", "quantity", "unit", "bought"]
                        .iter()
                        .filter_map(|k| row.get(*k).map(|v| ((*k).to_owned(), v.clone())))
                        .collect();
                    Value::Object(projected)
                })
                .collect(),
            Err(e) => {
                warn!(user_id, error = %e, "failed to fetch current groceries");
                Vec::new()
            }
        }
    }
}

fn to_row(item: &Value, focus: &GroceryFocus) -> Record {
    let mut row = Record::new();
    row.insert(
        "item_name".into(),
        item.get("item_name").cloned().unwrap_or_else(|| json!("Unknown Item")),
    );
    row.insert(
        "quantity".into(),
        item.get("quantity").filter(|v| !v.is_null()).cloned().unwrap_or_else(|| json!(1)),
    );
    row.insert(
        "unit".into(),
        item.get("unit").filter(|v| !v.is_null()).cloned().unwrap_or_else(|| json!("piece")),
    );
    row.insert(
        "price".into(),
        item.get("estimated_price")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| json!(0)),
    );
    row.insert("bought".into(), Value::Bool(false));
    row.insert("goal_id".into(), focus.goal_id.clone().unwrap_or(Value::Null));
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_inference() {
        assert_eq!(infer_focus("plan for Muscle Building", None).label, "muscle gain");
        assert_eq!(infer_focus("weight loss groceries", None).label, "weight loss");
        assert_eq!(infer_focus("something affordable", None).label, "budget eating");
        assert_eq!(infer_focus("weekly groceries", None).label, "general health");
    }

    #[test]
    fn active_goal_with_id_wins() {
        let goal = json!({
            "id": "g-7",
            "goal_type": "weight_loss",
            "title": "Lose 5kg",
            "target_value": 5,
            "target_unit": "kg"
        });
        let focus = infer_focus("muscle gain please", Some(&goal));
        assert_eq!(focus.label, "weight loss");
        assert_eq!(focus.goal_id, Some(json!("g-7")));
        let text = focus.context_text();
        assert!(text.contains("Goal Title: Lose 5kg"));
        assert!(text.contains("Target: 5 kg"));
    }

    #[test]
    fn goal_without_id_is_ignored() {
        let goal = json!({ "goal_type": "weight_loss" });
        let focus = infer_focus("budget list", Some(&goal));
        assert_eq!(focus.label, "budget eating");
        assert!(focus.goal.is_none());
        assert_eq!(
            focus.context_text(),
            "The user is asking for a grocery plan with a focus on budget eating."
        );
    }

    #[test]
    fn general_health_has_no_advice() {
        assert!(infer_focus("", None).advice().is_none());
    }

    #[test]
    fn rows_get_defaults() {
        let focus = infer_focus("", None);
        let row = to_row(&json!({ "item_name": "Bananas", "estimated_price": 40 }), &focus);
        assert_eq!(row["quantity"], 1);
        assert_eq!(row["unit"], "piece");
        assert_eq!(row["price"], 40);
        assert_eq!(row["bought"], false);
        assert_eq!(row["goal_id"], Value::Null);
    }
}
