//! Scripted collaborators for controller and screen tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};

use reportfeed_core::error::{AuthError, Error, ProtocolError, StoreError};
use reportfeed_core::{
    AccessToken, AuthSession, BoxChangeFeed, ChangeEvent, ChangeKind, Credentials, Filter,
    Identity, IdentityPatch, Query, Record, RecordId, RemoteStore, Result, Row, SessionProvider,
    SignUp, TableName, UserId,
};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn identity(id: &str) -> Identity {
    Identity {
        id: UserId::new(id).unwrap(),
        email: Some(format!("{id}@example.com")),
        display_name: None,
    }
}

/// A row of `table` owned by `owner`, created `minute` minutes past ten.
pub fn record(id: &str, owner: &str, minute: u32) -> Record {
    Record::new(json!({
        "id": id,
        "user_id": owner,
        "title": format!("report {id}"),
        "report": "body",
        "created_at": format!("2024-05-01T10:{minute:02}:00Z"),
    }))
    .unwrap()
}

/// Poll `condition` until it holds or [`WAIT`] passes.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition never held");
}

/// Let spawned tasks run for a moment.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Holds the next query until released.
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

/// In-memory store whose queries can be held open and failed on demand.
#[derive(Default)]
pub struct MockStore {
    rows: Mutex<Vec<Record>>,
    queries: Mutex<Vec<Query>>,
    gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    fail_next_query: Mutex<Option<String>>,
    fail_inserts: Mutex<Option<ProtocolError>>,
    fail_subscribe: Mutex<bool>,
    feeds: Mutex<Vec<mpsc::UnboundedSender<Result<ChangeEvent>>>>,
    inserted: AtomicUsize,
    next_minute: AtomicUsize,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Record>) -> Self {
        let store = Self::default();
        *store.rows.lock().unwrap() = rows;
        store
    }

    pub fn rows(&self) -> Vec<Record> {
        self.rows.lock().unwrap().clone()
    }

    pub fn set_rows(&self, rows: Vec<Record>) {
        *self.rows.lock().unwrap() = rows;
    }

    /// Hold the next query that starts until the gate is released.
    pub fn hold(&self) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().push_back(rx);
        Gate(tx)
    }

    pub fn fail_next_query(&self, message: &str) {
        *self.fail_next_query.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_inserts(&self, status: u16) {
        *self.fail_inserts.lock().unwrap() = Some(ProtocolError::new(
            status,
            Some("23505".to_string()),
            Some("duplicate key".to_string()),
        ));
    }

    pub fn fail_subscribe(&self) {
        *self.fail_subscribe.lock().unwrap() = true;
    }

    /// Number of queries started so far.
    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn last_query(&self) -> Option<Query> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn insert_count(&self) -> usize {
        self.inserted.load(Ordering::SeqCst)
    }

    /// Change feeds whose consumer is still attached.
    pub fn live_subscriptions(&self) -> usize {
        let mut feeds = self.feeds.lock().unwrap();
        feeds.retain(|tx| !tx.is_closed());
        feeds.len()
    }

    /// Push a change event to every attached feed.
    pub fn emit(&self, table: &str) {
        let event = ChangeEvent {
            table: TableName::new(table).unwrap(),
            kind: ChangeKind::Insert,
            record_id: None,
        };
        for tx in self.feeds.lock().unwrap().iter() {
            let _ = tx.send(Ok(event.clone()));
        }
    }

    /// Push a feed error to every attached feed.
    pub fn emit_error(&self) {
        for tx in self.feeds.lock().unwrap().iter() {
            let _ = tx.send(Err(StoreError::Transport {
                message: "socket reset".to_string(),
            }
            .into()));
        }
    }
}

#[async_trait]
impl RemoteStore for MockStore {
    type Changes = BoxChangeFeed;

    async fn query(&self, query: &Query) -> Result<Vec<Record>> {
        self.queries.lock().unwrap().push(query.clone());
        let gate = self.gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(message) = self.fail_next_query.lock().unwrap().take() {
            return Err(StoreError::Transport { message }.into());
        }
        // Deliberately ignores filters: the controller must not trust the store.
        let rows = self.rows.lock().unwrap().clone();
        Ok(Query::table(query.table.clone())
            .order(query.order.clone())
            .limit(query.limit)
            .apply(rows))
    }

    async fn insert(&self, table: &TableName, payload: &Row) -> Result<Record> {
        if let Some(rejection) = self.fail_inserts.lock().unwrap().clone() {
            return Err(StoreError::Rejected(rejection).into());
        }
        let n = self.inserted.fetch_add(1, Ordering::SeqCst) + 1;
        let minute = 30 + self.next_minute.fetch_add(1, Ordering::SeqCst);
        let mut row = payload.clone();
        row.insert("id", format!("{table}-{n}"));
        row.insert("created_at", format!("2024-05-01T10:{minute:02}:00Z"));
        let record = Record::new(row.into_value())?;
        self.rows.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update(&self, table: &TableName, id: &RecordId, patch: &Row) -> Result<Record> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                table: table.clone(),
                id: id.clone(),
            })?;
        let mut row = existing.row().clone();
        row.merge(patch);
        *existing = Record::new(row.into_value())?;
        Ok(existing.clone())
    }

    fn subscribe_changes(
        &self,
        _table: &TableName,
        _filter: Option<&Filter>,
    ) -> Result<BoxChangeFeed> {
        if *self.fail_subscribe.lock().unwrap() {
            return Err(StoreError::Transport {
                message: "realtime unavailable".to_string(),
            }
            .into());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        let stream = futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}

/// Session provider driven by the test.
pub struct MockSession {
    identity: watch::Sender<Option<Identity>>,
    sign_outs: AtomicUsize,
}

impl MockSession {
    pub fn signed_in(id: &str) -> Self {
        let (identity, _) = watch::channel(Some(identity(id)));
        Self {
            identity,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn signed_out() -> Self {
        let (identity, _) = watch::channel(None);
        Self {
            identity,
            sign_outs: AtomicUsize::new(0),
        }
    }

    pub fn set_identity(&self, identity: Option<Identity>) {
        self.identity.send_replace(identity);
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    fn session_for(identity: Identity) -> AuthSession {
        AuthSession {
            identity,
            access_token: AccessToken::new("token"),
            refresh_token: None,
        }
    }
}

/// Password the mock accepts.
pub const PASSWORD: &str = "secret1";

#[async_trait]
impl SessionProvider for MockSession {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        Ok(self.identity.borrow().clone())
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        if credentials.password() != PASSWORD {
            return Err(AuthError::InvalidCredentials("wrong password".to_string()).into());
        }
        let user = credentials.email().split('@').next().unwrap_or("user").to_string();
        let identity = identity(&user);
        self.identity.send_replace(Some(identity.clone()));
        Ok(Self::session_for(identity))
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        if request.password.len() < 6 {
            return Err(AuthError::WeakPassword("too short".to_string()).into());
        }
        let user = request.email.split('@').next().unwrap_or("user").to_string();
        let mut identity = identity(&user);
        identity.display_name = Some(request.display_name.clone());
        self.identity.send_replace(Some(identity.clone()));
        Ok(Self::session_for(identity))
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.identity.send_replace(None);
        Ok(())
    }

    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        let mut current = self
            .identity
            .borrow()
            .clone()
            .ok_or(Error::Auth(AuthError::NotAuthenticated))?;
        if let Some(name) = &patch.display_name {
            current.display_name = Some(name.clone());
        }
        self.identity.send_replace(Some(current.clone()));
        Ok(current)
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.identity.subscribe()
    }
}
