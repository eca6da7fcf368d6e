//! Subcommand implementations.

pub mod auth;
pub mod reports;
pub mod theme;
pub mod trend;
mod watch;
