//! Live query configuration.

use reportfeed_core::record::OWNER_COLUMN;
use reportfeed_core::{Filter, Identity, Order, Query, TableName};

/// What a [`LiveQuery`](crate::LiveQuery) reads and how it orders it.
///
/// ```
/// use reportfeed_core::TableName;
/// use reportfeed_live::LiveQueryConfig;
///
/// let latest_trend = LiveQueryConfig::new(TableName::new("trend_analyses").unwrap())
///     .owned()
///     .limit(1);
/// assert_eq!(latest_trend.owner_column(), Some("user_id"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQueryConfig {
    table: TableName,
    owner_column: Option<String>,
    filters: Vec<Filter>,
    order: Order,
    limit: Option<u32>,
}

impl LiveQueryConfig {
    /// All rows of `table`, newest first, unbounded.
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            owner_column: None,
            filters: Vec::new(),
            order: Order::default(),
            limit: None,
        }
    }

    /// Only rows owned by the signed-in identity, through `user_id`.
    pub fn owned(self) -> Self {
        self.owned_by(OWNER_COLUMN)
    }

    /// Only rows whose `column` holds the signed-in identity's id.
    pub fn owned_by(mut self, column: impl Into<String>) -> Self {
        self.owner_column = Some(column.into());
        self
    }

    /// Add a static equality filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// The owner column, when the query is scoped to the signed-in identity.
    pub fn owner_column(&self) -> Option<&str> {
        self.owner_column.as_deref()
    }

    /// The owner filter for `identity`, when owner-scoped.
    pub fn owner_filter(&self, identity: &Identity) -> Option<Filter> {
        self.owner_column
            .as_ref()
            .map(|column| Filter::eq(column.clone(), identity.id.as_str()))
    }

    /// The store query for `identity`.
    pub fn query_for(&self, identity: &Identity) -> Query {
        let mut query = Query::table(self.table.clone())
            .order(self.order.clone())
            .limit(self.limit);
        if let Some(owner) = self.owner_filter(identity) {
            query = query.filter(owner);
        }
        for filter in &self.filters {
            query = query.filter(filter.clone());
        }
        query
    }
}
