//! Traits for the external collaborators: remote store, session provider and
//! local key-value storage.

mod change_feed;
mod local_storage;
mod remote_store;
mod session_provider;

pub use change_feed::{BoxChangeFeed, ChangeFeed};
pub use local_storage::LocalStorage;
pub use remote_store::RemoteStore;
pub use session_provider::SessionProvider;
