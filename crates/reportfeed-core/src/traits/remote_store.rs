//! Remote store trait.

use async_trait::async_trait;

use crate::query::{Filter, Query};
use crate::record::{Record, Row};
use crate::types::{RecordId, TableName};
use crate::Result;

use super::ChangeFeed;

/// Query, write and subscribe capabilities against named tables.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Change feed type for this store.
    type Changes: ChangeFeed + 'static;

    /// Rows of `query.table` that pass every filter, in order, up to the limit.
    async fn query(&self, query: &Query) -> Result<Vec<Record>>;

    /// Insert a row. The store assigns `id` and `created_at`.
    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record>;

    /// Apply `patch` to the row with `id`.
    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record>;

    /// Subscribe to changes on `table`, optionally restricted by `filter`.
    ///
    /// Events carry no payload the caller is required to inspect.
    fn subscribe_changes(&self, table: &TableName, filter: Option<&Filter>)
    -> Result<Self::Changes>;
}

#[async_trait]
impl<T: RemoteStore + ?Sized> RemoteStore for std::sync::Arc<T> {
    type Changes = T::Changes;

    async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        (**self).query(query).await
    }

    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        (**self).insert(table, payload).await
    }

    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        (**self).update(table, id, patch).await
    }

    fn subscribe_changes(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> Result<Self::Changes> {
        (**self).subscribe_changes(table, filter)
    }
}
