//! reportfeed-rest - Hosted backend for reportfeed.
//!
//! Talks to a Postgres REST service, its auth service and its realtime
//! websocket, all rooted at one project URL and authorized with the
//! project's API key.

mod backend;
mod client;
mod endpoints;
mod realtime;

pub use backend::RestBackend;
pub use realtime::{HEARTBEAT_INTERVAL, RealtimeFeed};
