//! reportfeed-core - Core types and traits for the reportfeed client toolkit.

pub mod credentials;
pub mod error;
pub mod identity;
pub mod query;
pub mod record;
pub mod storage;
pub mod tokens;
pub mod traits;
pub mod types;

pub use credentials::Credentials;
pub use error::Error;
pub use identity::{AuthSession, Identity, IdentityPatch, SignUp};
pub use query::{Direction, Filter, Order, Query};
pub use record::{ChangeEvent, ChangeKind, Record, Row};
pub use storage::MemoryStorage;
pub use tokens::{AccessToken, RefreshToken};
pub use traits::{BoxChangeFeed, ChangeFeed, LocalStorage, RemoteStore, SessionProvider};
pub use types::{RecordId, StoreUrl, TableName, UserId};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
