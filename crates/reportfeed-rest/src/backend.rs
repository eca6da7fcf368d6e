//! Hosted store and session provider.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use reportfeed_core::error::{AuthError, Error, ProtocolError, StoreError};
use reportfeed_core::record::ID_COLUMN;
use reportfeed_core::{
    AccessToken, AuthSession, Credentials, Filter, Identity, IdentityPatch, Query, Record,
    RecordId, RefreshToken, RemoteStore, Result, Row, SessionProvider, SignUp, StoreUrl,
    TableName, UserId,
};

use crate::client::{RestClient, rejection};
use crate::endpoints::*;
use crate::realtime::{RealtimeFeed, Subscription};

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

    fn access_token(&self) -> Option<String> {
        self.get().map(|s| s.access_token.as_str().to_string())
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

/// Store and session provider for a hosted project.
///
/// Cloning shares the signed-in session.
#[derive(Debug, Clone)]
pub struct RestBackend {
    client: RestClient,
    session: Arc<SessionState>,
}

fn identity_of(user: &UserResponse) -> Result<Identity> {
    Ok(Identity {
        id: UserId::new(user.id.as_str())?,
        email: user.email.clone(),
        display_name: user.user_metadata.display_name.clone(),
    })
}

fn session_of(response: TokenResponse) -> Result<AuthSession> {
    Ok(AuthSession {
        identity: identity_of(&response.user)?,
        access_token: AccessToken::new(response.access_token),
        refresh_token: response.refresh_token.map(RefreshToken::new),
    })
}

fn message_of(p: &ProtocolError) -> String {
    p.message
        .clone()
        .or_else(|| p.code.clone())
        .unwrap_or_else(|| format!("HTTP {}", p.status))
}

/// Map a rejected sign-in to an auth error.
fn sign_in_error(err: Error) -> Error {
    match rejection(&err) {
        Some(p) if p.status == 400 || p.status == 401 => {
            AuthError::InvalidCredentials(message_of(p)).into()
        }
        _ => err,
    }
}

/// Map a rejected sign-up to an auth error.
fn sign_up_error(err: Error, email: &str) -> Error {
    let Some(p) = rejection(&err) else {
        return err;
    };
    if p.status != 400 && p.status != 422 {
        return err;
    }
    let code = p.code.as_deref().unwrap_or_default();
    let message = message_of(p);
    if code == "weak_password" || message.to_lowercase().contains("password") {
        AuthError::WeakPassword(message).into()
    } else if matches!(code, "user_already_exists" | "email_exists")
        || message.to_lowercase().contains("already registered")
    {
        AuthError::EmailTaken(email.to_string()).into()
    } else {
        err
    }
}

impl RestBackend {
    /// Create a backend for the project at `url`, authorized by `api_key`.
    pub fn new(url: StoreUrl, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(url, api_key)?,
            session: Arc::new(SessionState::new()),
        })
    }

    /// Returns the project URL.
    pub fn url(&self) -> &StoreUrl {
        self.client.url()
    }

    /// The current session, if signed in.
    pub fn session(&self) -> Option<AuthSession> {
        self.session.get()
    }

    /// Resume a session from persisted tokens.
    ///
    /// The access token is checked against the auth service. If it has
    /// expired and a refresh token is available, the session is refreshed.
    #[instrument(skip_all)]
    pub async fn restore(
        &self,
        access_token: AccessToken,
        refresh_token: Option<RefreshToken>,
    ) -> Result<AuthSession> {
        match self
            .client
            .auth_get::<UserResponse>(USER, access_token.as_str())
            .await
        {
            Ok(user) => {
                let session = AuthSession {
                    identity: identity_of(&user)?,
                    access_token,
                    refresh_token,
                };
                self.session.set(Some(session.clone()));
                debug!(user = %session.identity.id, "Restored session");
                Ok(session)
            }
            Err(e) if rejection(&e).is_some_and(ProtocolError::is_auth_error) => {
                let refresh_token = refresh_token.ok_or(AuthError::SessionExpired)?;
                self.refresh_with(&refresh_token).await
            }
            Err(e) => Err(e),
        }
    }

    /// Exchange the session's refresh token for new tokens.
    #[instrument(skip(self))]
    pub async fn refresh_session(&self) -> Result<AuthSession> {
        let refresh_token = self
            .session
            .get()
            .and_then(|s| s.refresh_token)
            .ok_or(AuthError::RefreshTokenInvalid)?;
        self.refresh_with(&refresh_token).await
    }

    async fn refresh_with(&self, refresh_token: &RefreshToken) -> Result<AuthSession> {
        info!("Refreshing session");

        let response: TokenResponse = self
            .client
            .auth_post(
                TOKEN,
                &[("grant_type", "refresh_token")],
                &RefreshGrant {
                    refresh_token: refresh_token.as_str(),
                },
                None,
            )
            .await
            .map_err(|e| match rejection(&e) {
                Some(p) if p.status == 400 || p.status == 401 => {
                    AuthError::RefreshTokenInvalid.into()
                }
                _ => e,
            })?;

        let session = session_of(response)?;
        self.session.set(Some(session.clone()));

        debug!("Session refreshed successfully");
        Ok(session)
    }

    fn require_session(&self) -> Result<AuthSession> {
        Ok(self.session.get().ok_or(AuthError::NotAuthenticated)?)
    }

    /// Map an auth rejection of a store call to `SessionExpired`, dropping
    /// the session so observers see it was lost.
    fn check_expired(&self, err: Error) -> Error {
        match rejection(&err) {
            Some(p) if p.is_auth_error() => {
                warn!(error = %p, "Access token rejected, session lost");
                self.session.set(None);
                AuthError::SessionExpired.into()
            }
            _ => err,
        }
    }

    fn decode_rows(rows: Vec<Value>) -> Result<Vec<Record>> {
        rows.into_iter()
            .map(|row| {
                Record::new(row).map_err(|e| {
                    Error::Store(StoreError::Malformed {
                        message: e.to_string(),
                    })
                })
            })
            .collect()
    }

    /// Query-string parameters for `query`.
    pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        for filter in &query.filters {
            params.push((filter.column.clone(), format!("eq.{}", filter.value)));
        }
        params.push((
            "order".to_string(),
            format!("{}.{}", query.order.column, query.order.direction.as_str()),
        ));
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

#[async_trait]
impl RemoteStore for RestBackend {
    type Changes = RealtimeFeed;

    #[instrument(skip(self), fields(table = %query.table))]
    async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        debug!("Querying rows");
        let token = self.session.access_token();
        let rows = self
            .client
            .select(query.table.as_str(), &Self::query_params(query), token.as_deref())
            .await
            .map_err(|e| self.check_expired(e))?;
        Self::decode_rows(rows)
    }

    #[instrument(skip(self, payload), fields(%table))]
    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        debug!("Inserting row");
        let token = self.session.access_token();
        let body = payload.clone().into_value();
        let rows = self
            .client
            .insert(table.as_str(), &body, token.as_deref())
            .await
            .map_err(|e| self.check_expired(e).into_write(table))?;

        Self::decode_rows(rows)?.into_iter().next().ok_or_else(|| {
            Error::Store(StoreError::Malformed {
                message: "insert returned no row".to_string(),
            })
            .into_write(table)
        })
    }

    #[instrument(skip(self, patch), fields(%table, %id))]
    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        debug!("Updating row");
        let token = self.session.access_token();
        let params = [(ID_COLUMN.to_string(), format!("eq.{}", id))];
        let body = patch.clone().into_value();
        let rows = self
            .client
            .update(table.as_str(), &params, &body, token.as_deref())
            .await
            .map_err(|e| self.check_expired(e).into_write(table))?;

        Self::decode_rows(rows)?.into_iter().next().ok_or_else(|| {
            Error::Store(StoreError::NotFound {
                table: table.clone(),
                id: id.clone(),
            })
            .into_write(table)
        })
    }

    fn subscribe_changes(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> Result<Self::Changes> {
        let subscription = Subscription {
            table: table.clone(),
            filter: filter.cloned(),
            access_token: self.session.access_token(),
        };
        Ok(RealtimeFeed::spawn(
            self.client.url().clone(),
            self.client.api_key().to_string(),
            subscription,
        ))
    }
}

#[async_trait]
impl SessionProvider for RestBackend {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.session.get().map(|s| s.identity))
    }

    #[instrument(skip(self, credentials), fields(email = %credentials.email()))]
    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        let response: TokenResponse = self
            .client
            .auth_post(
                TOKEN,
                &[("grant_type", "password")],
                &PasswordGrant {
                    email: credentials.email(),
                    password: credentials.password(),
                },
                None,
            )
            .await
            .map_err(sign_in_error)?;

        let session = session_of(response)?;
        self.session.set(Some(session.clone()));

        info!(user = %session.identity.id, "Signed in");
        Ok(session)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        let response: SignUpResponse = self
            .client
            .auth_post(
                SIGNUP,
                &[],
                &SignUpRequest {
                    email: &request.email,
                    password: &request.password,
                    data: UserMetadata {
                        display_name: Some(request.display_name.clone()),
                    },
                },
                None,
            )
            .await
            .map_err(|e| sign_up_error(e, &request.email))?;

        match response {
            SignUpResponse::Session(response) => {
                let session = session_of(response)?;
                self.session.set(Some(session.clone()));
                info!(user = %session.identity.id, "Created account");
                Ok(session)
            }
            SignUpResponse::Pending(user) => {
                info!(user = %user.id, "Account created, email confirmation pending");
                Err(AuthError::NotAuthenticated.into())
            }
        }
    }

    async fn sign_out(&self) -> Result<()> {
        if let Some(token) = self.session.access_token() {
            // The local session ends even if the server is unreachable.
            if let Err(e) = self.client.auth_post_no_response(LOGOUT, &token).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }
        self.session.set(None);
        info!("Signed out");
        Ok(())
    }

    #[instrument(skip(self, patch))]
    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        let session = self.require_session()?;

        let user: UserResponse = self
            .client
            .auth_put(
                USER,
                &UpdateUserRequest {
                    data: UserMetadata {
                        display_name: patch.display_name.clone(),
                    },
                },
                session.access_token.as_str(),
            )
            .await
            .map_err(|e| self.check_expired(e))?;

        let identity = identity_of(&user)?;
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
