//! File-backed store and session provider.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bcrypt::{DEFAULT_COST, hash, verify};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use reportfeed_core::error::{AuthError, Error, InvalidInputError};
use reportfeed_core::record::OWNER_COLUMN;
use reportfeed_core::{
    AccessToken, AuthSession, Credentials, Filter, Identity, IdentityPatch, Query, Record,
    RecordId, RemoteStore, Result, Row, SessionProvider, SignUp, StoreUrl, TableName, UserId,
};

use crate::changes::FileChangeFeed;
use crate::store::{FileStore, LocalAccount};

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug)]
struct SessionState {
    current: RwLock<Option<AuthSession>>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl SessionState {
    fn new() -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            current: RwLock::new(None),
            identity_tx,
        }
    }

    fn get(&self) -> Option<AuthSession> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set(&self, session: Option<AuthSession>) {
        let identity = session.as_ref().map(|s| s.identity.clone());
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = session;
        self.identity_tx.send_if_modified(|current| {
            if *current == identity {
                false
            } else {
                *current = identity;
                true
            }
        });
    }
}

/// Filesystem-backed store and session provider.
///
/// Cloning shares the signed-in session, so every clone observes sign-in
/// and sign-out made through any other.
#[derive(Debug, Clone)]
pub struct FileBackend {
    store: FileStore,
    url: StoreUrl,
    session: Arc<SessionState>,
    hash_cost: u32,
}

impl FileBackend {
    /// Create a new file backend at the given root directory.
    pub fn new(root: impl AsRef<Path>, url: StoreUrl) -> Self {
        Self {
            store: FileStore::new(root),
            url,
            session: Arc::new(SessionState::new()),
            hash_cost: DEFAULT_COST,
        }
    }

    /// Open the backend a `file://` URL points at.
    pub fn open(url: StoreUrl) -> Result<Self> {
        let root = url.to_file_path().ok_or_else(|| InvalidInputError::StoreUrl {
            value: url.to_string(),
            reason: "not a file:// URL".to_string(),
        })?;
        Ok(Self::new(root, url))
    }

    /// Use a different bcrypt cost for new accounts.
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Returns the backend URL.
    pub fn url(&self) -> &StoreUrl {
        &self.url
    }

    /// The current session, if signed in.
    pub fn session(&self) -> Option<AuthSession> {
        self.session.get()
    }

    /// Resume a session from a persisted access token.
    #[instrument(skip(self, access_token))]
    pub fn restore(&self, access_token: AccessToken) -> Result<AuthSession> {
        let account = self.validate_token(&access_token)?;
        let session = AuthSession {
            identity: identity_of(&account)?,
            access_token,
            refresh_token: None,
        };
        self.session.set(Some(session.clone()));
        debug!(user = %session.identity.id, "Restored session");
        Ok(session)
    }

    fn make_token(id: &UserId, password_hash: &str) -> AccessToken {
        let token = json!({
            "user_id": id.as_str(),
            "password_hash": password_hash,
        })
        .to_string();
        AccessToken::new(token)
    }

    fn parse_token(token: &AccessToken) -> Result<(UserId, String)> {
        let value: serde_json::Value = serde_json::from_str(token.as_str()).map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: format!("Invalid token JSON: {}", e),
            })
        })?;

        let id = value.get("user_id").and_then(|v| v.as_str()).ok_or_else(|| {
            Error::InvalidInput(InvalidInputError::Other {
                message: "Token missing 'user_id'".to_string(),
            })
        })?;

        let password_hash = value
            .get("password_hash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::InvalidInput(InvalidInputError::Other {
                    message: "Token missing 'password_hash'".to_string(),
                })
            })?;

        Ok((UserId::new(id)?, password_hash.to_string()))
    }

    fn validate_token(&self, token: &AccessToken) -> Result<LocalAccount> {
        let (id, password_hash) = Self::parse_token(token)?;
        let account = self
            .store
            .get_account(&id)?
            .ok_or(AuthError::SessionExpired)?;

        // A password change invalidates every token issued before it.
        if account.password_hash != password_hash {
            return Err(AuthError::SessionExpired.into());
        }

        Ok(account)
    }

    /// The signed-in account. A session whose token no longer validates is
    /// dropped and observers are told the session was lost.
    fn require_account(&self) -> Result<(AuthSession, LocalAccount)> {
        let session = self.session.get().ok_or(AuthError::NotAuthenticated)?;
        match self.validate_token(&session.access_token) {
            Ok(account) => Ok((session, account)),
            Err(e) => {
                warn!(user = %session.identity.id, error = %e, "Session no longer valid");
                self.session.set(None);
                Err(AuthError::SessionExpired.into())
            }
        }
    }

    fn ensure_owner(session: &AuthSession, row: &Row) -> Result<()> {
        match row.get_str(OWNER_COLUMN) {
            Some(owner) if owner != session.identity.id.as_str() => Err(
                AuthError::PermissionDenied(format!("row belongs to {owner}")).into(),
            ),
            _ => Ok(()),
        }
    }

    fn hash_password(&self, password: &str) -> Result<String> {
        hash(password, self.hash_cost).map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: e.to_string(),
            })
        })
    }
}

fn identity_of(account: &LocalAccount) -> Result<Identity> {
    Ok(Identity {
        id: UserId::new(account.id.as_str())?,
        email: Some(account.email.clone()),
        display_name: account.display_name.clone(),
    })
}

#[async_trait]
impl RemoteStore for FileBackend {
    type Changes = FileChangeFeed;

    #[instrument(skip(self), fields(table = %query.table))]
    async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        self.require_account()?;
        debug!("Querying rows");
        self.store.query(query)
    }

    #[instrument(skip(self, payload), fields(%table))]
    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        let (session, _) = self.require_account()?;
        Self::ensure_owner(&session, payload)?;
        debug!("Inserting row");
        self.store
            .insert(table, payload)
            .map_err(|e| e.into_write(table))
    }

    #[instrument(skip(self, patch), fields(%table, %id))]
    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        let (session, _) = self.require_account()?;
        Self::ensure_owner(&session, patch)?;
        if let Some(existing) = self.store.get(table, id).map_err(|e| e.into_write(table))? {
            Self::ensure_owner(&session, existing.row())?;
        }
        debug!("Updating row");
        self.store
            .update(table, id, patch)
            .map_err(|e| e.into_write(table))
    }

    fn subscribe_changes(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> Result<Self::Changes> {
        FileChangeFeed::from_store(self.store.clone(), table.clone(), filter.cloned())
    }
}

#[async_trait]
impl SessionProvider for FileBackend {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        match self.require_account() {
            Ok((session, _)) => Ok(Some(session.identity)),
            Err(e) if e.is_auth() => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        let account = self
            .store
            .find_account_by_email(credentials.email())?
            .ok_or_else(|| AuthError::InvalidCredentials("Account not found".to_string()))?;

        let ok = verify(credentials.password(), &account.password_hash).map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: e.to_string(),
            })
        })?;

        if !ok {
            return Err(AuthError::InvalidCredentials("Invalid password".to_string()).into());
        }

        let identity = identity_of(&account)?;
        let session = AuthSession {
            access_token: Self::make_token(&identity.id, &account.password_hash),
            identity,
            refresh_token: None,
        };
        self.session.set(Some(session.clone()));

        info!(user = %session.identity.id, "Signed in");

        Ok(session)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        let email = request.email.trim();
        if !email.contains('@') {
            return Err(InvalidInputError::Field {
                field: "email",
                reason: "must be an email address".to_string(),
            }
            .into());
        }

        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters"
            ))
            .into());
        }

        if self.store.find_account_by_email(email)?.is_some() {
            return Err(AuthError::EmailTaken(email.to_string()).into());
        }

        let password_hash = self.hash_password(&request.password)?;
        let account = self
            .store
            .create_account(email, &request.display_name, &password_hash)?;

        let identity = identity_of(&account)?;
        let session = AuthSession {
            access_token: Self::make_token(&identity.id, &account.password_hash),
            identity,
            refresh_token: None,
        };
        self.session.set(Some(session.clone()));

        info!(user = %session.identity.id, "Created account");

        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.session.get() {
            info!(user = %session.identity.id, "Signed out");
        }
        self.session.set(None);
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        let (session, mut account) = self.require_account()?;

        if let Some(name) = &patch.display_name {
            account.display_name = Some(name.clone());
        }
        self.store.save_account(&account)?;

        let identity = identity_of(&account)?;
        self.session.set(Some(AuthSession {
            identity: identity.clone(),
            ..session
        }));

        debug!(user = %identity.id, "Updated identity");

        Ok(identity)
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.session.identity_tx.subscribe()
    }
}
