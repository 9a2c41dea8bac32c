//! Operator-mode CLI handlers for learning plans.
//!
//! Implements:
//! - `lifeplan plans --user <id>`                       -- list a user's plans
//! - `lifeplan extend --user <id> <plan-id> [--weeks N]` -- append weeks to a plan

use anyhow::Result;
use serde_json::Value;

use lifeplan_core::{Agent, AgentResponse};
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore, SortOrder};

// -----------------------------------------------------------------------
// lifeplan plans
// -----------------------------------------------------------------------

pub async fn run_list_plans(store: &dyn RecordStore, user_id: &str) -> Result<()> {
    let plans = store
        .select(
            Collection::LearningPlans,
            &RecordQuery::owned_by(user_id).order_by("created_at", SortOrder::Desc),
        )
        .await?;

    if plans.is_empty() {
        println!("No learning plans found for {user_id}.");
        return Ok(());
    }
    print!("{}", render_plan_table(&plans));
    Ok(())
}

/// One row per plan: id, topic, milestone count and duration.
pub fn render_plan_table(plans: &[Record]) -> String {
    let text = |plan: &Record, key: &str| {
        plan.get(key)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    };
    let weeks = |plan: &Record| {
        plan.get("weekly_milestones")
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    };

    let id_w = 36;
    let topic_w = plans
        .iter()
        .map(|p| text(p, "topic").chars().count())
        .max()
        .unwrap_or(5)
        .max(5);

    let mut out = format!(
        "{:<id_w$}  {:<topic_w$}  {:>5}  {:>6}\n",
        "ID", "TOPIC", "WEEKS", "MONTHS"
    );
    out.push_str(&format!(
        "{}  {}  {}  {}\n",
        "-".repeat(id_w),
        "-".repeat(topic_w),
        "-".repeat(5),
        "-".repeat(6)
    ));
    for plan in plans {
        out.push_str(&format!(
            "{:<id_w$}  {:<topic_w$}  {:>5}  {:>6}\n",
            text(plan, "id"),
            text(plan, "topic"),
            weeks(plan),
            text(plan, "duration_months"),
        ));
    }
    out
}

// -----------------------------------------------------------------------
// lifeplan extend
// -----------------------------------------------------------------------

pub async fn run_extend(agent: &Agent, user_id: &str, plan_id: &str, weeks: i64) -> Result<()> {
    match agent.extend_plan(user_id, plan_id, weeks).await? {
        AgentResponse::PlanExtended {
            plan_id,
            new_weeks_added,
            total_weeks,
            duration_months,
            message,
        } => {
            println!("{message}");
            println!();
            println!("  Plan ID:     {plan_id}");
            println!("  Weeks added: {new_weeks_added}");
            println!("  Total weeks: {total_weeks}");
            println!("  Months:      {duration_months}");
        }
        other => println!("{}", serde_json::to_string_pretty(&other)?),
    }
    Ok(())
}
