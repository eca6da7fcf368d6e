//! Observable state of a live query.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use reportfeed_core::{Record, Result};

/// An ordered set of records held by one controller.
///
/// Replaced wholesale on every successful fetch. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Collection {
    records: Arc<Vec<Record>>,
}

impl Collection {
    /// Wrap records that are already in display order.
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    /// The records, in order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Decode every record into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.records.iter().map(|r| r.decode::<T>()).collect()
    }
}

/// What a screen shows for a live query. Exactly one holds at a time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LiveState {
    /// No data yet and a fetch is expected.
    #[default]
    Loading,
    /// The last fetch returned records.
    Ready(Collection),
    /// The last fetch returned nothing.
    Empty,
    /// The last fetch failed. The previous records, if any, are kept.
    Error {
        message: String,
        stale: Option<Collection>,
    },
    /// No session. The host should send the user to sign in.
    Unauthenticated,
}

impl LiveState {
    /// The records to display: the current collection, or the stale one
    /// while in error.
    pub fn collection(&self) -> Option<&Collection> {
        match self {
            LiveState::Ready(c) => Some(c),
            LiveState::Error { stale, .. } => stale.as_ref(),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LiveState::Loading)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LiveState::Error { .. })
    }

    /// Short name for logs and the terminal host.
    pub fn label(&self) -> &'static str {
        match self {
            LiveState::Loading => "loading",
            LiveState::Ready(_) => "ready",
            LiveState::Empty => "empty",
            LiveState::Error { .. } => "error",
            LiveState::Unauthenticated => "unauthenticated",
        }
    }

    /// The state after a failed fetch: the message, plus whatever records
    /// were on screen.
    pub(crate) fn failed(&self, message: String) -> LiveState {
        LiveState::Error {
            message,
            stale: self.collection().cloned(),
        }
    }
}

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshReason {
    /// First fetch after activation.
    Initial,
    /// The user pulled to refresh.
    PullToRefresh,
    /// The change feed reported a change.
    ChangeEvent,
    /// A write made through the controller, or an explicit request.
    Manual,
    /// The screen came back to the foreground.
    FocusRegained,
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RefreshReason::Initial => "initial",
            RefreshReason::PullToRefresh => "pull-to-refresh",
            RefreshReason::ChangeEvent => "change-event",
            RefreshReason::Manual => "manual",
            RefreshReason::FocusRegained => "focus-regained",
        };
        f.write_str(s)
    }
}
