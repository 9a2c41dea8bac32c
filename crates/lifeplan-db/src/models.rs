use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored record as seen by callers: a JSON object holding the record's
/// fields plus `id`, `user_id`, `created_at` and `updated_at`.
pub type Record = Map<String, Value>;

/// Keys owned by the store. They are stripped from incoming field maps and
/// filled from the row's columns on the way out.
pub const RESERVED_KEYS: [&str; 4] = ["id", "user_id", "created_at", "updated_at"];

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// A named, user-owned collection of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Users,
    Tasks,
    Groceries,
    Expenses,
    Goals,
    Commitments,
    Reminders,
    Notifications,
    LearningPlans,
}

impl Collection {
    /// Every collection, in migration order.
    pub const ALL: [Collection; 9] = [
        Self::Users,
        Self::Tasks,
        Self::Groceries,
        Self::Expenses,
        Self::Goals,
        Self::Commitments,
        Self::Reminders,
        Self::Notifications,
        Self::LearningPlans,
    ];

    /// Backing table name. Always a fixed identifier, safe to interpolate.
    pub fn table(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Tasks => "tasks",
            Self::Groceries => "groceries",
            Self::Expenses => "expenses",
            Self::Goals => "goals",
            Self::Commitments => "commitments",
            Self::Reminders => "reminders",
            Self::Notifications => "notifications",
            Self::LearningPlans => "learning_plans",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl FromStr for Collection {
    type Err = CollectionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.table() == s)
            .ok_or_else(|| CollectionParseError(s.to_owned()))
    }
}

/// Error returned when parsing an invalid [`Collection`] string.
#[derive(Debug, Clone)]
pub struct CollectionParseError(pub String);

impl fmt::Display for CollectionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid collection: {:?}", self.0)
    }
}

impl std::error::Error for CollectionParseError {}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A raw row from any collection table.
#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: Uuid,
    pub user_id: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordRow {
    /// Flatten the row into a [`Record`]: the `data` object's fields plus the
    /// store-owned columns.
    pub fn into_record(self) -> Record {
        let mut record = match self.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        record.insert("id".into(), Value::String(self.id.to_string()));
        record.insert("user_id".into(), Value::String(self.user_id));
        record.insert(
            "created_at".into(),
            Value::String(self.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert(
            "updated_at".into(),
            Value::String(self.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record
    }
}

/// Remove store-owned keys from a field map before it is written.
pub fn strip_reserved(mut fields: Record) -> Record {
    for key in RESERVED_KEYS {
        fields.remove(key);
    }
    fields
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_display_roundtrip() {
        for c in Collection::ALL {
            let parsed: Collection = c.to_string().parse().expect("should parse");
            assert_eq!(c, parsed);
        }
    }

    #[test]
    fn collection_invalid() {
        assert!("pantry".parse::<Collection>().is_err());
    }

    #[test]
    fn learning_plans_table_name() {
        assert_eq!(Collection::LearningPlans.table(), "learning_plans");
    }

    #[test]
    fn row_flattens_into_record() {
        let id = Uuid::new_v4();
        let row = RecordRow {
            id,
            user_id: "u-1".to_string(),
            data: json!({ "title": "Buy milk", "priority": 2 }),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let record = row.into_record();
        assert_eq!(record["title"], "Buy milk");
        assert_eq!(record["priority"], 2);
        assert_eq!(record["id"], json!(id.to_string()));
        assert_eq!(record["user_id"], "u-1");
        assert!(record["created_at"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn strip_reserved_drops_owned_keys() {
        let fields = json!({ "id": "x", "user_id": "y", "item_name": "Milk" });
        let stripped = strip_reserved(fields.as_object().unwrap().clone());
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key("item_name"));
    }
}
