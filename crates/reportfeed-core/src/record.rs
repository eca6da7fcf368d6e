//! Rows, records and change notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, InvalidInputError};
use crate::types::{RecordId, TableName};

/// Column holding the record key.
pub const ID_COLUMN: &str = "id";
/// Column holding the creation timestamp.
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Column holding the owner's user id.
pub const OWNER_COLUMN: &str = "user_id";

/// A JSON object used as an insert payload or an update patch.
///
/// # Example
///
/// ```
/// use reportfeed_core::Row;
/// use serde_json::json;
///
/// let row = Row::empty().with("title", "Weekly").with("report", "...");
/// assert_eq!(row.get_str("title"), Some("Weekly"));
/// assert!(Row::new(json!([1, 2])).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Map<String, Value>);

impl Row {
    /// Create a row from a JSON value. The value must be an object.
    pub fn new(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(InvalidInputError::Row {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }
            .into()),
        }
    }

    /// An empty row.
    pub fn empty() -> Self {
        Self(Map::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Set a column, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Returns a column value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns a column value if it is a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Iterate over the columns.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Copy every column of `patch` over this row.
    pub fn merge(&mut self, patch: &Row) {
        for (k, v) in patch.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Convert into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Row::new(value).map_err(serde::de::Error::custom)
    }
}

/// A row returned by the store.
///
/// Guaranteed to be a JSON object with an `id` and a parseable `created_at`.
/// Everything else is opaque; interpretation is left to the screen models.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    id: RecordId,
    created_at: DateTime<Utc>,
    row: Row,
}

impl Record {
    /// Validate a JSON value as a record.
    pub fn new(value: Value) -> Result<Self, Error> {
        let row = Row::new(value)?;

        let id = match row.get(ID_COLUMN) {
            Some(Value::String(s)) => RecordId::new(s.as_str())?,
            Some(Value::Number(n)) => RecordId::new(n.to_string())?,
            _ => {
                return Err(InvalidInputError::Row {
                    reason: "missing 'id'".to_string(),
                }
                .into());
            }
        };

        let created_at = row
            .get_str(CREATED_AT_COLUMN)
            .ok_or_else(|| InvalidInputError::Row {
                reason: "missing 'created_at'".to_string(),
            })
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| InvalidInputError::Row {
                    reason: format!("bad 'created_at' {s:?}: {e}"),
                })
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id,
            created_at,
            row,
        })
    }

    /// The record key.
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    /// The creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The owner stored in `column`, if it is a string.
    pub fn owner(&self, column: &str) -> Option<&str> {
        self.row.get_str(column)
    }

    /// Returns a column value.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.row.get(column)
    }

    /// Returns a column value if it is a string.
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.row.get_str(column)
    }

    /// Borrow all columns.
    pub fn row(&self) -> &Row {
        &self.row
    }

    /// Decode into a typed model.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_value(Value::Object(self.row.as_map().clone())).map_err(|e| {
            InvalidInputError::Row {
                reason: format!("record {} does not decode: {e}", self.id),
            }
            .into()
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.row.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Record::new(value).map_err(serde::de::Error::custom)
    }
}

/// The kind of change reported by a change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Anything the backend reports that is not one of the above.
    Other,
}

impl ChangeKind {
    /// Parse the backend's event type name, case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "insert" | "create" => ChangeKind::Insert,
            "update" => ChangeKind::Update,
            "delete" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

/// "Something changed in this table."
///
/// Consumers are not required to inspect anything beyond the table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The table that changed.
    pub table: TableName,
    /// What happened.
    pub kind: ChangeKind,
    /// The affected record, when the backend reports it.
    pub record_id: Option<RecordId>,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
