//! Field manifests for every structured payload, and the validator that
//! enforces them.
//!
//! The prompt builder renders its instructions from these same manifests,
//! so what the model is asked for and what the validator accepts are one
//! definition.

use serde_json::Value;

/// The JSON type a field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// A whole number.
    Integer,
    /// Integer or float.
    Number,
    Boolean,
    /// Any JSON array.
    List,
    /// An array of strings.
    TextList,
    Object,
    /// A date/time string, normalized later.
    DateTime,
}

impl FieldKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Text | Self::DateTime => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::List => value.is_array(),
            Self::TextList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Object => value.is_object(),
        }
    }

    /// Human-readable type name used in prompts and errors.
    pub fn label(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::List => "array",
            Self::TextList => "array of strings",
            Self::Object => "object",
            Self::DateTime => "ISO date-time string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Short description shown to the model.
    pub hint: &'static str,
}

const fn req(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: true,
        hint,
    }
}

const fn opt(name: &'static str, kind: FieldKind, hint: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind,
        required: false,
        hint,
    }
}

/// A named field manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl Schema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.required)
    }
}

use FieldKind::*;

pub const TASK: Schema = Schema {
    name: "task",
    fields: &[
        req("title", Text, "Task title"),
        opt("description", Text, "Optional description"),
        opt("category", Text, "Personal/Work/Health/Learning"),
        opt("priority", Integer, "1-3 (1=high, 2=medium, 3=low)"),
        opt("estimate", Integer, "minutes to complete"),
        opt("due_absolute_iso", DateTime, "2026-08-31T17:00:00 (if a time is specified)"),
        opt("tags", TextList, "relevant tags"),
        opt("status", Text, "Inbox"),
        opt("location", Text, "if a location is mentioned"),
    ],
};

pub const GOAL: Schema = Schema {
    name: "goal",
    fields: &[
        req("title", Text, "Goal title"),
        opt("progress_percentage", Number, "0"),
        opt("deadline", DateTime, "2026-12-31T23:59:59 (if specified)"),
    ],
};

pub const COMMITMENT: Schema = Schema {
    name: "commitment",
    fields: &[
        req("title", Text, "Event/Meeting title"),
        opt(
            "type",
            Text,
            "class/hackathon/gym/social/exam (ONLY these 5 types are allowed)",
        ),
        req("start_time", DateTime, "2026-08-31T14:00:00"),
        opt("end_time", DateTime, "2026-08-31T15:00:00"),
        opt("location", Text, "if mentioned"),
        opt("reminder_minutes", Integer, "15"),
    ],
};

pub const GROCERY: Schema = Schema {
    name: "grocery",
    fields: &[
        req("item_name", Text, "Grocery item name"),
        opt("quantity", Number, "numeric quantity"),
        opt("unit", Text, "kg/g/liter/pc"),
        opt("store", Text, "store name if mentioned"),
        opt("price", Number, "numeric price if mentioned"),
    ],
};

pub const EXPENSE: Schema = Schema {
    name: "expense",
    fields: &[
        req(
            "category",
            Text,
            "Food/Transport/Entertainment/Shopping/Bills/Health/Education",
        ),
        req("amount", Number, "numeric amount"),
        opt("description", Text, "What was purchased"),
        opt("expense_date", Text, "YYYY-MM-DD"),
    ],
};

pub const REMINDER: Schema = Schema {
    name: "reminder",
    fields: &[
        req("title", Text, "Reminder title"),
        req("due_date", DateTime, "2026-08-31T15:00:00"),
        opt("category", Text, "personal/work/health"),
    ],
};

pub const NOTIFICATION: Schema = Schema {
    name: "notification",
    fields: &[
        req("message", Text, "Notification message"),
        opt("type", Text, "reminder/achievement/warning/info"),
    ],
};

pub const PLAN_DETAILS: Schema = Schema {
    name: "plan_details",
    fields: &[
        req("topic", Text, "What to learn"),
        opt("duration_text", Text, "How long (e.g. '3 months', '8 weeks')"),
        opt("duration_months", Number, "numeric duration in months"),
    ],
};

pub const ANALYTICS: Schema = Schema {
    name: "analyze_data",
    fields: &[
        req("analysis_type", Text, "budget/tasks/productivity/learning"),
        opt("data", Object, "analysis findings"),
    ],
};

pub const QUESTION: Schema = Schema {
    name: "answer_question",
    fields: &[req("answer", Text, "Your helpful response here.")],
};

pub const MILESTONE: Schema = Schema {
    name: "milestone",
    fields: &[
        req("week", Integer, "The week number"),
        req("title", Text, "A concise title for the week's focus"),
        req("description", Text, "A brief overview of what will be covered"),
        req("topics_covered", List, "3-5 specific topics to study"),
        req(
            "learning_objectives",
            List,
            "3-5 specific, measurable learning goals for the week",
        ),
        req(
            "tasks",
            List,
            "3-5 actionable tasks, including estimated time in parentheses",
        ),
        req(
            "estimated_hours",
            Number,
            "Total estimated learning hours for the week",
        ),
        req("tips", List, "2-3 practical tips or best practices for the week"),
        req("resources", List, "2-3 recommended resources"),
    ],
};

pub const GROCERY_PLAN_ITEM: Schema = Schema {
    name: "grocery plan item",
    fields: &[
        req("item_name", Text, "Paneer"),
        opt("quantity", Number, "200"),
        opt("unit", Text, "g"),
        opt("estimated_price", Number, "90"),
    ],
};

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{context}: expected a JSON object")]
    NotAnObject { context: String },

    #[error("{context}: expected a JSON array")]
    NotAnArray { context: String },

    #[error("{context}: no entries")]
    Empty { context: String },

    #[error("{context}: missing field `{field}`")]
    MissingField {
        context: String,
        field: &'static str,
    },

    #[error("{context}: field `{field}` must be {expected}")]
    WrongType {
        context: String,
        field: &'static str,
        expected: &'static str,
    },
}

/// Check `value` against `schema`. Reports the first offending field.
///
/// Optional fields may be absent or `null`; a `null` required field counts
/// as missing.
pub fn validate(value: &Value, schema: &Schema) -> Result<(), ValidationError> {
    validate_in(value, schema, schema.name)
}

/// Check every element of a JSON array against `schema`. Errors name the
/// 1-based element index, e.g. `milestone 3: missing field `tasks``.
pub fn validate_each(value: &Value, schema: &Schema) -> Result<(), ValidationError> {
    let items = value.as_array().ok_or_else(|| ValidationError::NotAnArray {
        context: format!("{} list", schema.name),
    })?;
    if items.is_empty() {
        return Err(ValidationError::Empty {
            context: format!("{} list", schema.name),
        });
    }
    for (i, item) in items.iter().enumerate() {
        validate_in(item, schema, &format!("{} {}", schema.name, i + 1))?;
    }
    Ok(())
}

fn validate_in(value: &Value, schema: &Schema, context: &str) -> Result<(), ValidationError> {
    let object = value.as_object().ok_or_else(|| ValidationError::NotAnObject {
        context: context.to_owned(),
    })?;

    for field in schema.fields {
        match object.get(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(ValidationError::MissingField {
                    context: context.to_owned(),
                    field: field.name,
                });
            }
            None | Some(Value::Null) => {}
            Some(v) if !field.kind.accepts(v) => {
                return Err(ValidationError::WrongType {
                    context: context.to_owned(),
                    field: field.name,
                    expected: field.kind.label(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn milestone(week: i64) -> Value {
        json!({
            "week": week,
            "title": format!("Week {week}: Basics"),
            "description": "Intro",
            "topics_covered": ["a", "b"],
            "learning_objectives": ["x"],
            "tasks": ["Read chapter 1 (2h)"],
            "estimated_hours": 6,
            "tips": ["Practice"],
            "resources": ["Book"]
        })
    }

    #[test]
    fn complete_milestone_is_accepted() {
        assert_eq!(validate(&milestone(1), &MILESTONE), Ok(()));
    }

    #[test]
    fn removing_any_required_field_rejects() {
        for field in MILESTONE.required_fields() {
            let mut m = milestone(1);
            m.as_object_mut().unwrap().remove(field.name);
            assert_eq!(
                validate(&m, &MILESTONE),
                Err(ValidationError::MissingField {
                    context: "milestone".into(),
                    field: field.name,
                }),
                "removing {} should reject",
                field.name
            );
        }
    }

    #[test]
    fn estimated_hours_accepts_int_or_float() {
        let mut m = milestone(1);
        m["estimated_hours"] = json!(7.5);
        assert!(validate(&m, &MILESTONE).is_ok());
        m["estimated_hours"] = json!("7");
        assert!(matches!(
            validate(&m, &MILESTONE),
            Err(ValidationError::WrongType {
                field: "estimated_hours",
                ..
            })
        ));
    }

    #[test]
    fn week_must_be_integral() {
        let mut m = milestone(1);
        m["week"] = json!(1.5);
        assert!(validate(&m, &MILESTONE).is_err());
    }

    #[test]
    fn sequence_errors_name_the_index() {
        let mut third = milestone(3);
        third.as_object_mut().unwrap().remove("tasks");
        let list = json!([milestone(1), milestone(2), third]);
        let err = validate_each(&list, &MILESTONE).unwrap_err();
        assert_eq!(err.to_string(), "milestone 3: missing field `tasks`");
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(matches!(
            validate_each(&json!([]), &MILESTONE),
            Err(ValidationError::Empty { .. })
        ));
    }

    #[test]
    fn optional_fields_may_be_null() {
        let task = json!({ "title": "Call mom", "location": null });
        assert!(validate(&task, &TASK).is_ok());
    }

    #[test]
    fn tags_must_be_strings() {
        let task = json!({ "title": "Call mom", "tags": [1, 2] });
        assert_eq!(
            validate(&task, &TASK).unwrap_err().to_string(),
            "task: field `tags` must be array of strings"
        );
    }

    #[test]
    fn non_object_rejected() {
        assert!(matches!(
            validate(&json!("task"), &TASK),
            Err(ValidationError::NotAnObject { .. })
        ));
    }
}
