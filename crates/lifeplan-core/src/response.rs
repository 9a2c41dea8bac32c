//! The response envelope returned for every request.

use lifeplan_db::Record;
use serde::Serialize;
use serde_json::Value;

use crate::error::PipelineError;
use crate::executor::CreatedItem;
use crate::grocery::GroceryPlan;
use crate::learning::{PlanCreated, PlanExtended};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentResponse {
    CreationSuccess {
        item: Record,
        message: String,
    },
    PlanCreated {
        plan: Value,
        message: String,
        plan_id: String,
        created_tasks_count: usize,
    },
    GroceryPlanCreated {
        message: String,
        items_added: usize,
        estimated_total_cost: f64,
        goal_type: String,
        items: Vec<Record>,
    },
    PlanExtended {
        plan_id: String,
        new_weeks_added: u32,
        total_weeks: usize,
        duration_months: Value,
        message: String,
    },
    Answer {
        text: String,
    },
    Error {
        error: String,
    },
}

impl AgentResponse {
    pub fn error(err: &PipelineError) -> Self {
        Self::Error {
            error: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<CreatedItem> for AgentResponse {
    fn from(created: CreatedItem) -> Self {
        Self::CreationSuccess {
            item: created.item,
            message: created.message,
        }
    }
}

impl From<PlanCreated> for AgentResponse {
    fn from(created: PlanCreated) -> Self {
        Self::PlanCreated {
            created_tasks_count: created.created_tasks.len(),
            plan: created.plan,
            message: created.message,
            plan_id: created.plan_id,
        }
    }
}

impl From<GroceryPlan> for AgentResponse {
    fn from(plan: GroceryPlan) -> Self {
        Self::GroceryPlanCreated {
            message: plan.message,
            items_added: plan.items.len(),
            estimated_total_cost: plan.estimated_total_cost,
            goal_type: plan.goal_type,
            items: plan.items,
        }
    }
}

impl From<PlanExtended> for AgentResponse {
    fn from(ext: PlanExtended) -> Self {
        Self::PlanExtended {
            plan_id: ext.plan_id,
            new_weeks_added: ext.new_weeks_added,
            total_weeks: ext.total_weeks,
            duration_months: ext.duration_months,
            message: ext.message,
        }
    }
}
