//! Query description passed to a [`RemoteStore`](crate::RemoteStore).

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{CREATED_AT_COLUMN, Record};
use crate::types::TableName;

/// An equality filter on one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Column name.
    pub column: String,
    /// Value the column must equal, compared as text.
    pub value: String,
}

impl Filter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Returns true if the record's column equals the filter value.
    ///
    /// Non-string scalars are compared through their JSON text, so a filter
    /// value of `"3"` matches both `"3"` and `3`.
    pub fn matches(&self, record: &Record) -> bool {
        match record.get(&self.column) {
            Some(Value::String(s)) => s == &self.value,
            Some(Value::Null) | None => false,
            Some(other) => other.to_string() == self.value,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ascending,
    #[default]
    Descending,
}

impl Direction {
    /// The keyword used in `order=` query parameters.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Ascending => "asc",
            Direction::Descending => "desc",
        }
    }
}

/// Ordering of a query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Column to sort by.
    pub column: String,
    /// Direction.
    pub direction: Direction,
}

impl Default for Order {
    /// Newest first.
    fn default() -> Self {
        Self {
            column: CREATED_AT_COLUMN.to_string(),
            direction: Direction::Descending,
        }
    }
}

impl Order {
    /// Sort by `column` in `direction`.
    pub fn by(column: impl Into<String>, direction: Direction) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Compare two records under this ordering.
    ///
    /// `created_at` compares as a timestamp; other columns compare numbers
    /// numerically and everything else as text. Missing values sort last in
    /// either direction. Ties break on the record id so the order is total.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = if self.column == CREATED_AT_COLUMN {
            Some(a.created_at().cmp(&b.created_at()))
        } else {
            match (a.get(&self.column), b.get(&self.column)) {
                (None | Some(Value::Null), None | Some(Value::Null)) => Some(Ordering::Equal),
                (None | Some(Value::Null), _) => return Ordering::Greater,
                (_, None | Some(Value::Null)) => return Ordering::Less,
                (Some(x), Some(y)) => Some(compare_values(x, y)),
            }
        };

        let ord = primary
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id().cmp(b.id()));

        match self.direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    }
}

fn compare_values(x: &Value, y: &Value) -> Ordering {
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => match (x.as_str(), y.as_str()) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => x.to_string().cmp(&y.to_string()),
        },
    }
}

/// A read against one table: filters, ordering and an optional limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// The table to read.
    pub table: TableName,
    /// Equality filters, all of which must hold.
    pub filters: Vec<Filter>,
    /// Result ordering.
    pub order: Order,
    /// Maximum number of rows, unbounded when `None`.
    pub limit: Option<u32>,
}

impl Query {
    /// All rows of `table`, newest first.
    pub fn table(table: TableName) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: Order::default(),
            limit: None,
        }
    }

    /// Add an equality filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Replace the ordering.
    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    /// Limit the number of rows.
    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns true if the record passes every filter.
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|f| f.matches(record))
    }

    /// Filter, sort and truncate an in-memory result set.
    ///
    /// Backends that cannot push the query down use this so every backend
    /// returns the same shape.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        let mut out: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        out.sort_by(|a, b| self.order.compare(a, b));
        if let Some(limit) = self.limit {
            out.truncate(limit as usize);
        }
        out
    }
}
