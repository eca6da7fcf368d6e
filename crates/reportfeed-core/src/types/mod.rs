//! Core identifier and address types.
//!
//! These types enforce their invariants at construction time, so a table
//! name or record id that reaches a backend is always safe to use as a path
//! segment or query value.

mod ids;
mod store_url;
mod table_name;

pub use ids::{RecordId, UserId};
pub use store_url::StoreUrl;
pub use table_name::TableName;
