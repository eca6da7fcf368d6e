//! Latest trend summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reportfeed_core::{RemoteStore, Result, SessionProvider, TableName};

use crate::{LiveQuery, LiveQueryConfig, LiveState};

pub const TREND_TABLE: &str = "trend_analyses";

/// One row of `trend_analyses`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub trends: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The newest trend analysis of the signed-in user.
pub struct TrendCapsule<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    live: LiveQuery<S, P>,
}

impl<S, P> TrendCapsule<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    pub fn config() -> Result<LiveQueryConfig> {
        Ok(LiveQueryConfig::new(TableName::new(TREND_TABLE)?)
            .owned()
            .limit(1))
    }

    pub fn new(store: S, session: P) -> Result<Self> {
        Ok(Self {
            live: LiveQuery::new(store, session, Self::config()?),
        })
    }

    pub fn live(&self) -> &LiveQuery<S, P> {
        &self.live
    }

    /// The trends text, or `None` for "no data".
    pub fn latest(&self) -> Option<String> {
        Self::latest_in(&self.live.state())
    }

    /// The trends text held by `state`. Blank text counts as no data.
    pub fn latest_in(state: &LiveState) -> Option<String> {
        let trend: TrendAnalysis = state.collection()?.first()?.decode().ok()?;
        trend.trends.filter(|t| !t.trim().is_empty())
    }
}
