//! Backend wrapper for CLI use.

use async_trait::async_trait;
use tokio::sync::watch;

use reportfeed_core::{
    AccessToken, AuthSession, BoxChangeFeed, Credentials, Filter, Identity, IdentityPatch, Query,
    Record, RecordId, RefreshToken, RemoteStore, Result, Row, SessionProvider, SignUp, StoreUrl,
    TableName,
};
use reportfeed_file::FileBackend;
use reportfeed_rest::RestBackend;

/// Either backend, behind one set of trait impls.
#[derive(Debug)]
pub enum Backend {
    File(FileBackend),
    Rest(RestBackend),
}

impl Backend {
    /// Open the backend at `url`. Hosted projects need `api_key`.
    pub fn open(url: StoreUrl, api_key: Option<&str>) -> Result<Self> {
        if url.is_local() {
            Ok(Backend::File(FileBackend::open(url)?))
        } else {
            Ok(Backend::Rest(RestBackend::new(url, api_key.unwrap_or_default())?))
        }
    }

    pub fn url(&self) -> &StoreUrl {
        match self {
            Backend::File(backend) => backend.url(),
            Backend::Rest(backend) => backend.url(),
        }
    }

    /// The signed-in session, with its tokens.
    pub fn session(&self) -> Option<AuthSession> {
        match self {
            Backend::File(backend) => backend.session(),
            Backend::Rest(backend) => backend.session(),
        }
    }

    /// Resume a persisted session.
    pub async fn restore(
        &self,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) -> Result<AuthSession> {
        match self {
            Backend::File(backend) => backend.restore(access_token),
            Backend::Rest(backend) => backend.restore(access_token, refresh_token).await,
        }
    }
}

#[async_trait]
impl RemoteStore for Backend {
    type Changes = BoxChangeFeed;

    async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        match self {
            Backend::File(backend) => backend.query(query).await,
            Backend::Rest(backend) => backend.query(query).await,
        }
    }

    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        match self {
            Backend::File(backend) => backend.insert(table, payload).await,
            Backend::Rest(backend) => backend.insert(table, payload).await,
        }
    }

    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        match self {
            Backend::File(backend) => backend.update(table, id, patch).await,
            Backend::Rest(backend) => backend.update(table, id, patch).await,
        }
    }

    fn subscribe_changes(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> Result<BoxChangeFeed> {
        let feed: BoxChangeFeed = match self {
            Backend::File(backend) => Box::pin(backend.subscribe_changes(table, filter)?),
            Backend::Rest(backend) => Box::pin(backend.subscribe_changes(table, filter)?),
        };
        Ok(feed)
    }
}

#[async_trait]
impl SessionProvider for Backend {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        match self {
            Backend::File(backend) => backend.current_identity().await,
            Backend::Rest(backend) => backend.current_identity().await,
        }
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        match self {
            Backend::File(backend) => backend.sign_in(credentials).await,
            Backend::Rest(backend) => backend.sign_in(credentials).await,
        }
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        match self {
            Backend::File(backend) => backend.sign_up(request).await,
            Backend::Rest(backend) => backend.sign_up(request).await,
        }
    }

    async fn sign_out(&self) -> Result<()> {
        match self {
            Backend::File(backend) => backend.sign_out().await,
            Backend::Rest(backend) => backend.sign_out().await,
        }
    }

    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        match self {
            Backend::File(backend) => backend.update_identity(patch).await,
            Backend::Rest(backend) => backend.update_identity(patch).await,
        }
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        match self {
            Backend::File(backend) => backend.watch_identity(),
            Backend::Rest(backend) => backend.watch_identity(),
        }
    }
}
