//! Learning plans: week-indexed milestone sequences that are generated
//! once and extended any number of times.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use chrono_tz::Tz;
use lifeplan_db::{Collection, Record, RecordQuery, RecordStore, StoreError};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::extract::{Container, extract};
use crate::intent::PlanRequest;
use crate::model::{GenerationRequest, ModelChain};
use crate::prompt;
use crate::schema::{self, MILESTONE};
use crate::timezone;

/// Completion ceiling for milestone generation.
pub const PLAN_MAX_TOKENS: u32 = 4000;

const FIRST_WEEK_TAGS: [&str; 2] = ["learning", "auto-generated"];
const FIRST_WEEK_PRIORITY: i64 = 2;
const FIRST_WEEK_ESTIMATE_MINUTES: i64 = 45;

// ---------------------------------------------------------------------------
// Week arithmetic
// ---------------------------------------------------------------------------

/// The count from an `N week(s)` phrase, if the text has one.
pub fn explicit_weeks(duration_text: &str) -> Option<u32> {
    let lower = duration_text.to_lowercase();
    let bytes = lower.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        let digits = &lower[start..i];
        let rest = lower[i..].trim_start();
        if rest.starts_with("week") {
            return digits.parse().ok();
        }
    }
    None
}

/// Number of milestones to request: the larger of `ceil(months * 4)` and
/// any explicit week count in the text, never less than one.
pub fn target_week_count(duration_text: &str, duration_months: f64) -> u32 {
    let monthly = if duration_months.is_finite() && duration_months > 0.0 {
        (duration_months * 4.0).ceil() as u32
    } else {
        0
    };
    explicit_weeks(duration_text)
        .unwrap_or(0)
        .max(monthly)
        .max(1)
}

/// `"1 month"`, `"3 months"`, `"1.5 months"`.
pub fn months_text(months: f64) -> String {
    let unit = if months == 1.0 { "month" } else { "months" };
    format!("{} {unit}", months_value(months))
}

/// Store whole month counts as integers.
fn months_value(months: f64) -> Value {
    if months.fract() == 0.0 && months.abs() < i64::MAX as f64 {
        json!(months as i64)
    } else {
        json!(months)
    }
}

/// Renumber `milestones` from `first_week`. With `retitle`, titles become
/// `Week N: <title without any existing "Week k:" prefix>`.
pub fn renumber(milestones: &mut [Value], first_week: usize, retitle: bool) {
    for (offset, milestone) in milestones.iter_mut().enumerate() {
        let week = first_week + offset;
        let Some(obj) = milestone.as_object_mut() else {
            continue;
        };
        obj.insert("week".into(), json!(week));
        if retitle {
            let title = obj.get("title").and_then(Value::as_str).unwrap_or_default();
            let bare = title.split_once(':').map_or(title, |(_, rest)| rest).trim();
            obj.insert("title".into(), json!(format!("Week {week}: {bare}")));
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Outcome of [`LearningPlanEngine::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanCreated {
    pub plan_id: String,
    pub plan: Value,
    pub created_tasks: Vec<Record>,
    pub message: String,
}

/// Outcome of [`LearningPlanEngine::extend`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlanExtended {
    pub plan_id: String,
    pub new_weeks_added: u32,
    pub total_weeks: usize,
    pub duration_months: Value,
    pub weekly_milestones: Vec<Value>,
    pub message: String,
}

pub struct LearningPlanEngine {
    store: Arc<dyn RecordStore>,
    chain: Arc<ModelChain>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl LearningPlanEngine {
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
        }
    }

    /// Ask the model for `weeks` milestones and validate every one.
    pub async fn generate_milestones(
        &self,
        topic: &str,
        duration_text: &str,
        weeks: u32,
    ) -> Result<Vec<Value>, PipelineError> {
        info!(topic, duration_text, weeks, "generating milestones");
        let request = GenerationRequest::new(prompt::learning_prompt(topic, duration_text, weeks))
            .with_temperature(0.2)
            .with_max_tokens(PLAN_MAX_TOKENS);
        let reply = self.chain.invoke(&request).await?;

        let value = extract(&reply.text, Container::Array)?;
        schema::validate_each(&value, &MILESTONE)?;
        let Value::Array(mut milestones) = value else {
            return Err(schema::ValidationError::NotAnArray {
                context: "milestone list".into(),
            }
            .into());
        };

        // Extra weeks are dropped; a short list is kept as-is and callers
        // report the count actually received.
        if milestones.len() != weeks as usize {
            warn!(
                requested = weeks,
                received = milestones.len(),
                "model returned a different number of milestones"
            );
            milestones.truncate(weeks as usize);
        }
        Ok(milestones)
    }

    /// Generate, persist, and seed the first week's tasks.
    pub async fn create(
        &self,
        user_id: &str,
        request: &PlanRequest,
    ) -> Result<PlanCreated, PipelineError> {
        let weeks = target_week_count(&request.duration_text, request.duration_months);
        let mut milestones = self
            .generate_milestones(&request.topic, &request.duration_text, weeks)
            .await?;
        renumber(&mut milestones, 1, false);

        let mut row = Record::new();
        row.insert("topic".into(), json!(request.topic));
        row.insert("duration_text".into(), json!(request.duration_text));
        row.insert("duration_months".into(), months_value(request.duration_months));
        row.insert("weekly_milestones".into(), Value::Array(milestones.clone()));

        let stored = self
            .store
            .insert(Collection::LearningPlans, user_id, vec![row])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Rejected {
                collection: Collection::LearningPlans,
                reason: "insert returned no rows".into(),
            })?;
        let plan_id = stored
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        info!(user_id, %plan_id, weeks = milestones.len(), "learning plan stored");

        let created_tasks = self.seed_first_week(user_id, &milestones).await;

        let milestone_titles: Vec<Value> = milestones
            .iter()
            .enumerate()
            .map(|(i, m)| {
                m.get("title")
                    .cloned()
                    .unwrap_or_else(|| json!(format!("Week {}", i + 1)))
            })
            .collect();

        Ok(PlanCreated {
            message: format!(
                "Created learning plan for {} with {} tasks for the first week.",
                request.topic,
                created_tasks.len()
            ),
            plan: json!({
                "id": plan_id,
                "topic": request.topic,
                "duration_text": request.duration_text,
                "duration_months": months_value(request.duration_months),
                "weekly_milestones": milestones,
                "milestone_titles": milestone_titles,
            }),
            plan_id,
            created_tasks,
        })
    }

    /// Turn the first milestone's tasks into task records due on
    /// consecutive days. Failures are logged and yield no tasks.
    async fn seed_first_week(&self, user_id: &str, milestones: &[Value]) -> Vec<Record> {
        let Some(first) = milestones.first() else {
            return Vec::new();
        };
        let week_title = first
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Week 1");
        let now = timezone::now_in(self.timezone, self.clock.as_ref());

        let rows: Vec<Record> = first
            .get("tasks")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(task_text)
            .enumerate()
            .map(|(i, title)| {
                let due = timezone::from_local(now + ChronoDuration::days(i as i64 + 1));
                let mut row = Record::new();
                row.insert("title".into(), json!(title));
                row.insert(
                    "description".into(),
                    json!(format!("Part of learning plan: {week_title}")),
                );
                row.insert("priority".into(), json!(FIRST_WEEK_PRIORITY));
                row.insert("estimate".into(), json!(FIRST_WEEK_ESTIMATE_MINUTES));
                row.insert("due_date".into(), json!(due.utc));
                row.insert("due_date_utc".into(), json!(due.utc));
                row.insert("due_date_local".into(), json!(due.local));
                row.insert("timezone".into(), json!(due.timezone));
                row.insert("tags".into(), json!(FIRST_WEEK_TAGS));
                row.insert("status".into(), json!("Inbox"));
                row
            })
            .collect();

        if rows.is_empty() {
            return Vec::new();
        }
        match self.store.insert(Collection::Tasks, user_id, rows).await {
            Ok(created) => created,
            Err(e) => {
                warn!(user_id, error = %e, "failed to create first-week tasks");
                Vec::new()
            }
        }
    }

    /// Append `additional_weeks` freshly generated milestones to a plan.
    pub async fn extend(
        &self,
        user_id: &str,
        plan_id: &str,
        additional_weeks: i64,
    ) -> Result<PlanExtended, PipelineError> {
        let weeks = u32::try_from(additional_weeks)
            .ok()
            .filter(|w| *w > 0)
            .ok_or(PipelineError::InvalidWeekCount(additional_weeks))?;

        let not_found = || PipelineError::PlanNotFound {
            plan_id: plan_id.to_owned(),
        };
        let plan = self
            .store
            .select(
                Collection::LearningPlans,
                &RecordQuery::owned_by(user_id).filter("id", plan_id).limit(1),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(not_found)?;

        let mut milestones = match plan.get("weekly_milestones") {
            Some(Value::Array(existing)) => existing.clone(),
            _ => Vec::new(),
        };
        let current_weeks = milestones.len();
        let topic = plan
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Topic");

        let mut fresh = self
            .generate_milestones(topic, &format!("{weeks} weeks"), weeks)
            .await?;
        renumber(&mut fresh, current_weeks + 1, true);
        let added = u32::try_from(fresh.len()).unwrap_or(weeks);
        milestones.extend(fresh);

        let current_months = plan
            .get("duration_months")
            .and_then(Value::as_f64)
            .filter(|m| *m >= 0.0)
            .unwrap_or(0.0);
        let duration_months = months_value(current_months + f64::from(added.div_ceil(4)));

        let mut patch = Record::new();
        patch.insert("weekly_milestones".into(), Value::Array(milestones.clone()));
        patch.insert("duration_months".into(), duration_months.clone());
        self.store
            .update(Collection::LearningPlans, user_id, plan_id, patch)
            .await?
            .ok_or_else(not_found)?;

        info!(user_id, plan_id, added, total = milestones.len(), "learning plan extended");
        Ok(PlanExtended {
            plan_id: plan_id.to_owned(),
            new_weeks_added: added,
            total_weeks: milestones.len(),
            duration_months,
            message: format!("Successfully extended learning plan with {added} additional weeks"),
            weekly_milestones: milestones,
        })
    }
}

fn task_text(task: &Value) -> Option<String> {
    match task {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(obj) => ["title", "task", "name"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(str::to_owned),
        _ => None,
    }
}
