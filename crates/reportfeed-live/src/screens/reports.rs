//! Reports feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use reportfeed_core::{RemoteStore, Result, Row, SessionProvider, TableName};

use super::require_field;
use crate::{LiveQuery, LiveQueryConfig, LiveState};

pub const REPORTS_TABLE: &str = "Reports";

/// Title given to reports created without one.
pub const DEFAULT_TITLE: &str = "Untitled Report";

/// One row of `Reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Body text.
    #[serde(default)]
    pub report: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn title(&self) -> &str {
        match self.title.as_deref() {
            Some(title) if !title.trim().is_empty() => title,
            _ => DEFAULT_TITLE,
        }
    }

    pub fn body(&self) -> &str {
        self.report.as_deref().unwrap_or_default()
    }
}

/// The signed-in user's reports, newest first.
pub struct ReportsFeed<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    live: LiveQuery<S, P>,
}

impl<S, P> ReportsFeed<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    pub fn config() -> Result<LiveQueryConfig> {
        Ok(LiveQueryConfig::new(TableName::new(REPORTS_TABLE)?).owned())
    }

    pub fn new(store: S, session: P) -> Result<Self> {
        Ok(Self {
            live: LiveQuery::new(store, session, Self::config()?),
        })
    }

    /// The underlying controller.
    pub fn live(&self) -> &LiveQuery<S, P> {
        &self.live
    }

    /// Create a report from user input.
    ///
    /// `content` is trimmed; blank content is rejected before the store is
    /// touched. A missing or blank title becomes [`DEFAULT_TITLE`].
    #[instrument(skip(self, content))]
    pub async fn create_report(&self, title: Option<&str>, content: &str) -> Result<Report> {
        require_field("content", content)?;
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        let payload = Row::empty()
            .with("title", title)
            .with("report", content.trim());
        self.live.create_record(payload).await?.decode()
    }

    /// The reports currently on screen, including stale ones shown under an
    /// error.
    pub fn reports(&self) -> Result<Vec<Report>> {
        Self::decode(&self.live.state())
    }

    /// Decode the reports held by `state`.
    pub fn decode(state: &LiveState) -> Result<Vec<Report>> {
        match state.collection() {
            Some(collection) => collection.decode(),
            None => Ok(Vec::new()),
        }
    }
}
