//! reportfeed-file - Filesystem-backed store and session provider.
//!
//! Keeps accounts, tables and an append-only change log under one root
//! directory. Intended for development and tests without a hosted backend.

mod backend;
mod changes;
mod kv;
mod store;

pub use backend::FileBackend;
pub use changes::FileChangeFeed;
pub use kv::FileKeyValue;
