//! Change feed stream trait.

use std::pin::Pin;

use futures_core::Stream;

use crate::Result;
use crate::record::ChangeEvent;

/// Stream of change notifications for one table.
///
/// Dropping the stream cancels the subscription and releases whatever the
/// backend holds for it (socket, file watcher).
pub trait ChangeFeed: Stream<Item = Result<ChangeEvent>> + Send {}

impl<T> ChangeFeed for T where T: Stream<Item = Result<ChangeEvent>> + Send {}

/// A type-erased change feed, for callers that mix backends.
pub type BoxChangeFeed = Pin<Box<dyn ChangeFeed>>;
