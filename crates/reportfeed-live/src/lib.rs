//! reportfeed-live - Live queries and screen bindings for reportfeed.
//!
//! The [`LiveQuery`] controller keeps a collection of records current
//! against any [`RemoteStore`](reportfeed_core::RemoteStore): it subscribes
//! to the table's change feed, refetches on events and on demand, coalesces
//! overlapping refreshes and tears down on session loss.
//!
//! ```no_run
//! use reportfeed_core::StoreUrl;
//! use reportfeed_file::FileBackend;
//! use reportfeed_live::screens::ReportsFeed;
//! use reportfeed_live::RefreshReason;
//!
//! # async fn example() -> reportfeed_core::Result<()> {
//! let backend = std::sync::Arc::new(FileBackend::open(StoreUrl::new("file:///tmp/rf")?)?);
//! let feed = ReportsFeed::new(backend.clone(), backend)?;
//! feed.live().activate().await;
//! feed.live().refresh(RefreshReason::PullToRefresh).await;
//! for report in feed.reports()? {
//!     println!("{}", report.title());
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod controller;
mod gate;
pub mod screens;
mod state;
pub mod theme;

pub use config::LiveQueryConfig;
pub use controller::LiveQuery;
pub use gate::require_identity;
pub use state::{Collection, LiveState, RefreshReason};
pub use theme::{Palette, Theme, ThemeStore};
