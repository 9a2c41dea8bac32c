//! Typed intent envelopes parsed from model output.

use std::fmt;
use std::str::FromStr;

use lifeplan_db::{Collection, Record};
use serde_json::Value;

use crate::error::PipelineError;
use crate::schema::{self, Schema, ValidationError};

// ---------------------------------------------------------------------------
// Intent
// ---------------------------------------------------------------------------

/// The recognized intents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    CreateItem,
    GenerateLearningPlan,
    AnalyzeData,
    AnswerQuestion,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateItem => "create_item",
            Self::GenerateLearningPlan => "generate_learning_plan",
            Self::AnalyzeData => "analyze_data",
            Self::AnswerQuestion => "answer_question",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = IntentParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_item" => Ok(Self::CreateItem),
            "generate_learning_plan" => Ok(Self::GenerateLearningPlan),
            "analyze_data" => Ok(Self::AnalyzeData),
            "answer_question" => Ok(Self::AnswerQuestion),
            other => Err(IntentParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Intent`] string.
#[derive(Debug, Clone)]
pub struct IntentParseError(pub String);

impl fmt::Display for IntentParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid intent: {:?}", self.0)
    }
}

impl std::error::Error for IntentParseError {}

// ---------------------------------------------------------------------------
// Item types
// ---------------------------------------------------------------------------

/// How one date-bearing field is normalized: `source` is read, and the
/// results are written to `target` (UTC), `<target>_utc`, `<target>_local`
/// and `timezone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRule {
    pub source: &'static str,
    pub target: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    Task,
    Goal,
    Commitment,
    Grocery,
    Expense,
    Reminder,
    Notification,
}

impl ItemType {
    pub const ALL: [ItemType; 7] = [
        Self::Task,
        Self::Goal,
        Self::Commitment,
        Self::Grocery,
        Self::Expense,
        Self::Reminder,
        Self::Notification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Goal => "goal",
            Self::Commitment => "commitment",
            Self::Grocery => "grocery",
            Self::Expense => "expense",
            Self::Reminder => "reminder",
            Self::Notification => "notification",
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            Self::Task => Collection::Tasks,
            Self::Goal => Collection::Goals,
            Self::Commitment => Collection::Commitments,
            Self::Grocery => Collection::Groceries,
            Self::Expense => Collection::Expenses,
            Self::Reminder => Collection::Reminders,
            Self::Notification => Collection::Notifications,
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            Self::Task => &schema::TASK,
            Self::Goal => &schema::GOAL,
            Self::Commitment => &schema::COMMITMENT,
            Self::Grocery => &schema::GROCERY,
            Self::Expense => &schema::EXPENSE,
            Self::Reminder => &schema::REMINDER,
            Self::Notification => &schema::NOTIFICATION,
        }
    }

    pub fn date_rules(self) -> &'static [DateRule] {
        match self {
            Self::Task => &[DateRule {
                source: "due_absolute_iso",
                target: "due_date",
            }],
            Self::Commitment => &[
                DateRule {
                    source: "start_time",
                    target: "start_time",
                },
                DateRule {
                    source: "end_time",
                    target: "end_time",
                },
            ],
            Self::Reminder => &[DateRule {
                source: "due_date",
                target: "due_date",
            }],
            Self::Goal => &[DateRule {
                source: "deadline",
                target: "deadline",
            }],
            Self::Grocery | Self::Expense | Self::Notification => &[],
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemType {
    type Err = ItemTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ItemTypeParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`ItemType`] string.
#[derive(Debug, Clone)]
pub struct ItemTypeParseError(pub String);

impl fmt::Display for ItemTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid item type: {:?}", self.0)
    }
}

impl std::error::Error for ItemTypeParseError {}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ItemPayload {
    pub item_type: ItemType,
    pub fields: Record,
}

/// Parameters for creating a learning plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub topic: String,
    pub duration_text: String,
    pub duration_months: f64,
}

impl PlanRequest {
    /// Build from a `plan_details` object.
    ///
    /// A missing `duration_text` is derived from the month count; missing
    /// `duration_months` is derived from an explicit week count in the text
    /// (weeks / 4), else 1.
    pub fn from_details(details: &Value) -> Result<Self, ValidationError> {
        schema::validate(details, &schema::PLAN_DETAILS)?;

        let topic = details["topic"].as_str().unwrap_or_default().trim().to_owned();
        if topic.is_empty() {
            return Err(ValidationError::MissingField {
                context: schema::PLAN_DETAILS.name.to_owned(),
                field: "topic",
            });
        }

        let text = details
            .get("duration_text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let months = details
            .get("duration_months")
            .and_then(Value::as_f64)
            .filter(|m| *m > 0.0);

        let duration_months = match (months, text) {
            (Some(m), _) => m,
            (None, Some(t)) => crate::learning::explicit_weeks(t)
                .map(|w| f64::from(w) / 4.0)
                .unwrap_or(1.0),
            (None, None) => 1.0,
        };
        let duration_text = match text {
            Some(t) => t.to_owned(),
            None => crate::learning::months_text(duration_months),
        };

        Ok(Self {
            topic,
            duration_text,
            duration_months,
        })
    }
}

/// A validated, typed intent. Consumed once by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum IntentEnvelope {
    CreateItem(ItemPayload),
    GenerateLearningPlan(PlanRequest),
    AnalyzeData { analysis_type: String, data: Value },
    AnswerQuestion { answer: String },
}

impl IntentEnvelope {
    pub fn intent(&self) -> Intent {
        match self {
            Self::CreateItem(_) => Intent::CreateItem,
            Self::GenerateLearningPlan(_) => Intent::GenerateLearningPlan,
            Self::AnalyzeData { .. } => Intent::AnalyzeData,
            Self::AnswerQuestion { .. } => Intent::AnswerQuestion,
        }
    }

    /// Parse and validate a model-produced JSON object.
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        let Value::Object(mut object) = value else {
            return Err(ValidationError::NotAnObject {
                context: "intent envelope".into(),
            }
            .into());
        };

        let intent: Intent = match object.get("intent").and_then(Value::as_str) {
            Some(name) => name
                .parse()
                .map_err(|e: IntentParseError| PipelineError::UnknownIntent(e.0))?,
            None => {
                return Err(PipelineError::UnknownIntent(
                    "response carried no intent".into(),
                ));
            }
        };

        match intent {
            Intent::CreateItem => {
                let item_type = object
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|t| t.parse::<ItemType>().ok())
                    .ok_or(ValidationError::WrongType {
                        context: "create_item".into(),
                        field: "type",
                        expected: "one of task/goal/commitment/grocery/expense/reminder/notification",
                    })?;
                let data = object.remove("data").unwrap_or(Value::Null);
                schema::validate(&data, item_type.schema())?;
                let Value::Object(fields) = data else {
                    return Err(ValidationError::NotAnObject {
                        context: item_type.as_str().into(),
                    }
                    .into());
                };
                Ok(Self::CreateItem(ItemPayload { item_type, fields }))
            }
            Intent::GenerateLearningPlan => {
                let details = object.remove("plan_details").unwrap_or(Value::Null);
                Ok(Self::GenerateLearningPlan(PlanRequest::from_details(
                    &details,
                )?))
            }
            Intent::AnalyzeData => {
                let envelope = Value::Object(object);
                schema::validate(&envelope, &schema::ANALYTICS)?;
                Ok(Self::AnalyzeData {
                    analysis_type: envelope["analysis_type"]
                        .as_str()
                        .unwrap_or_default()
                        .to_owned(),
                    data: envelope.get("data").cloned().unwrap_or(Value::Null),
                })
            }
            Intent::AnswerQuestion => {
                let envelope = Value::Object(object);
                schema::validate(&envelope, &schema::QUESTION)?;
                Ok(Self::AnswerQuestion {
                    answer: envelope["answer"].as_str().unwrap_or_default().to_owned(),
                })
            }
        }
    }
}
