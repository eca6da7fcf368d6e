//! Live Query Controller.
//!
//! Keeps one [`Collection`] current against a remote table: subscribes to the
//! table's change feed, refetches on events and on demand, and tears
//! everything down on deactivation or session loss.
//!
//! Bookkeeping lives in [`Control`] behind a `std::sync::Mutex`. The lock is
//! only held for check-and-set steps, never across an `.await`. Fetches run
//! on a spawned driver task, so a caller that drops its `refresh()` future
//! cannot leave `in_flight` set.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::{oneshot, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, instrument, warn};

use reportfeed_core::record::OWNER_COLUMN;
use reportfeed_core::{
    ChangeFeed, Identity, Record, RemoteStore, Result, Row, SessionProvider, UserId,
};

use crate::config::LiveQueryConfig;
use crate::gate::require_identity;
use crate::state::{Collection, LiveState, RefreshReason};

/// A subscription-backed, refreshable collection of records.
///
/// Dropping the controller deactivates it.
pub struct LiveQuery<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    inner: Arc<Inner<S, P>>,
}

struct Inner<S, P> {
    store: S,
    session: P,
    config: LiveQueryConfig,
    state: watch::Sender<LiveState>,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    /// Set from the start of `activate()` until teardown.
    active: bool,
    /// Bumped on every activation and teardown. Work started under an older
    /// generation changes nothing when it completes.
    generation: u64,
    /// Identity captured at activation; owner filters resolve to it.
    identity: Option<Identity>,
    /// Whose records the published state holds. Survives teardown, since
    /// `deactivate()` leaves the state in place.
    shown_for: Option<UserId>,
    in_flight: bool,
    /// Reason of the single follow-up fetch requested while one was in flight.
    pending: Option<RefreshReason>,
    /// Callers resolved when the fetch in flight completes.
    current_waiters: Vec<oneshot::Sender<()>>,
    /// Callers resolved when the follow-up fetch completes.
    next_waiters: Vec<oneshot::Sender<()>>,
    driver: Option<AbortHandle>,
    /// Change feed forwarder, session watcher, and re-activation.
    tasks: Vec<AbortHandle>,
}

impl<S, P> LiveQuery<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    /// Create an inactive controller in the `Loading` state.
    pub fn new(store: S, session: P, config: LiveQueryConfig) -> Self {
        let (state, _) = watch::channel(LiveState::default());
        Self {
            inner: Arc::new(Inner {
                store,
                session,
                config,
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Resolve the session, subscribe to changes, then fetch.
    ///
    /// Without a session the controller publishes `Unauthenticated` and stays
    /// inactive. Rows left on screen by another user are replaced with
    /// `Loading` before anything is fetched. Activating an active controller
    /// does nothing.
    pub async fn activate(&self) {
        self.inner.activate().await
    }

    /// Stop everything this controller started.
    ///
    /// Cancels the fetch in flight, drops the subscription and the session
    /// watcher, and resolves every waiting `refresh()` caller. The published
    /// state is left as it was. Idempotent; issues no store calls.
    pub fn deactivate(&self) {
        let mut control = self.inner.lock();
        if !control.active {
            return;
        }
        self.inner.teardown(&mut control);
        info!(table = %self.inner.config.table(), "live query deactivated");
    }

    /// Reconcile the collection with the store and return the resulting state.
    ///
    /// While a fetch is in flight no second query is issued: the request is
    /// folded into one follow-up fetch, and this call resolves when that
    /// follow-up completes. On an inactive controller returns the current
    /// state without touching the store.
    #[instrument(skip(self), fields(table = %self.inner.config.table()))]
    pub async fn refresh(&self, reason: RefreshReason) -> LiveState {
        self.inner.refresh(reason).await
    }

    /// The hosting screen came back to the foreground.
    pub async fn focus_regained(&self) -> LiveState {
        self.refresh(RefreshReason::FocusRegained).await
    }

    /// Ask for a refresh without waiting for it. The result arrives through
    /// [`watch`](Self::watch).
    ///
    /// Returns `false` when the controller is not serving refreshes.
    pub fn request_refresh(&self, reason: RefreshReason) -> bool {
        self.inner.request(reason).is_some()
    }

    /// Insert `payload` as a row owned by the signed-in identity, then
    /// refresh.
    ///
    /// Store rejections come back as [`Error::Write`](reportfeed_core::Error::Write)
    /// so the caller can keep its input.
    #[instrument(skip(self, payload), fields(table = %self.inner.config.table()))]
    pub async fn create_record(&self, payload: Row) -> Result<Record> {
        let identity = require_identity(&self.inner.session).await?;
        let table = self.inner.config.table();
        let column = self.inner.config.owner_column().unwrap_or(OWNER_COLUMN);

        let mut payload = payload;
        payload.insert(column, identity.id.as_str());

        let record = self
            .inner
            .store
            .insert(table, &payload)
            .await
            .map_err(|e| e.into_write(table))?;
        info!(id = %record.id(), "record created");

        self.refresh(RefreshReason::Manual).await;
        Ok(record)
    }

    /// The state as last published.
    pub fn state(&self) -> LiveState {
        self.inner.state.borrow().clone()
    }

    /// Observe state changes.
    pub fn watch(&self) -> watch::Receiver<LiveState> {
        self.inner.state.subscribe()
    }

    /// Whether a spinner should show: a fetch is running, or nothing has
    /// loaded yet on an active controller.
    pub fn is_busy(&self) -> bool {
        let control = self.inner.lock();
        control.in_flight || (control.active && self.inner.state.borrow().is_loading())
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().active
    }

    pub fn config(&self) -> &LiveQueryConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn session(&self) -> &P {
        &self.inner.session
    }
}

impl<S, P> Drop for LiveQuery<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<S, P> Inner<S, P>
where
    S: RemoteStore + 'static,
    P: SessionProvider + 'static,
{
    fn lock(&self) -> MutexGuard<'_, Control> {
        // Control holds plain flags; a panic elsewhere does not corrupt them.
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn activate(self: &Arc<Self>) {
        let table = self.config.table();
        let generation = {
            let mut control = self.lock();
            if control.active {
                debug!(%table, "already active");
                return;
            }
            control.active = true;
            control.generation += 1;
            control.generation
        };

        // Subscribed before the session is read, so a sign-out or switch
        // landing while activation is underway still reaches the watcher.
        let identity_rx = self.session.watch_identity();

        let identity = match require_identity(&self.session).await {
            Ok(identity) => identity,
            Err(err) => {
                let mut control = self.lock();
                if control.generation != generation {
                    return;
                }
                control.active = false;
                let next = if err.is_auth() {
                    info!(%table, "no session, not activating");
                    LiveState::Unauthenticated
                } else {
                    warn!(%table, error = %err, "could not resolve session");
                    // Nobody to vouch for the rows on screen.
                    control.shown_for = None;
                    LiveState::Error {
                        message: err.to_string(),
                        stale: None,
                    }
                };
                self.state.send_replace(next);
                return;
            }
        };

        let owner = self.config.owner_filter(&identity);
        let feed = match self.store.subscribe_changes(table, owner.as_ref()) {
            Ok(feed) => Some(feed),
            Err(err) => {
                warn!(%table, error = %err, "change feed unavailable, serving manual refreshes only");
                None
            }
        };

        {
            let mut control = self.lock();
            if control.generation != generation {
                debug!(%table, "deactivated while activating");
                return;
            }
            control.identity = Some(identity.clone());
            if let Some(feed) = feed {
                let forwarder = tokio::spawn(Arc::clone(self).forward_changes(feed));
                control.tasks.push(forwarder.abort_handle());
            }
            let watcher = tokio::spawn(Arc::clone(self).watch_session(
                generation,
                identity.id.clone(),
                identity_rx,
            ));
            control.tasks.push(watcher.abort_handle());

            let unauthenticated = matches!(*self.state.borrow(), LiveState::Unauthenticated);
            if unauthenticated || control.shown_for.as_ref() != Some(&identity.id) {
                self.state.send_replace(LiveState::Loading);
                control.shown_for = Some(identity.id.clone());
            }
        }
        info!(%table, user = %identity.id, "live query active");

        self.refresh(RefreshReason::Initial).await;
    }

    async fn refresh(self: &Arc<Self>, reason: RefreshReason) -> LiveState {
        if let Some(done) = self.request(reason) {
            // A dropped sender means teardown; the state is current either way.
            let _ = done.await;
        }
        self.state.borrow().clone()
    }

    /// Register a refresh request. Starts the driver unless one is running.
    ///
    /// Returns a receiver resolved once the fetch honouring this request has
    /// settled, or `None` if the controller is not serving refreshes.
    fn request(self: &Arc<Self>, reason: RefreshReason) -> Option<oneshot::Receiver<()>> {
        let mut control = self.lock();
        if !control.active || control.identity.is_none() {
            debug!(%reason, "inactive, refresh ignored");
            return None;
        }

        let (tx, rx) = oneshot::channel();
        if control.in_flight {
            debug!(%reason, "fetch in flight, refresh coalesced");
            control.pending = Some(reason);
            control.next_waiters.push(tx);
        } else {
            control.in_flight = true;
            control.current_waiters.push(tx);
            let generation = control.generation;
            let driver = tokio::spawn(Arc::clone(self).drive(generation, reason));
            control.driver = Some(driver.abort_handle());
        }
        Some(rx)
    }

    /// Fetch until no follow-up is pending.
    async fn drive(self: Arc<Self>, generation: u64, reason: RefreshReason) {
        let table = self.config.table();
        let mut reason = reason;
        loop {
            let identity = {
                let control = self.lock();
                match &control.identity {
                    Some(identity) if control.generation == generation => identity.clone(),
                    _ => return,
                }
            };

            debug!(%table, %reason, "fetching");
            let result = self.store.query(&self.config.query_for(&identity)).await;

            let mut control = self.lock();
            if control.generation != generation {
                debug!(%table, %reason, "discarding fetch from a previous activation");
                return;
            }

            let next = match result {
                Ok(records) => self.settle(&identity, records),
                Err(err) => {
                    warn!(%table, %reason, error = %err, "fetch failed");
                    self.state.borrow().failed(err.to_string())
                }
            };
            self.state.send_replace(next);

            for waiter in control.current_waiters.drain(..) {
                let _ = waiter.send(());
            }

            match control.pending.take() {
                Some(follow_up) => {
                    control.current_waiters = std::mem::take(&mut control.next_waiters);
                    reason = follow_up;
                }
                None => {
                    control.in_flight = false;
                    control.driver = None;
                    return;
                }
            }
        }
    }

    /// Turn a fetch result into the next state, dropping rows that belong to
    /// someone else.
    fn settle(&self, identity: &Identity, records: Vec<Record>) -> LiveState {
        let records = match self.config.owner_column() {
            Some(column) => {
                let fetched = records.len();
                let owned: Vec<Record> = records
                    .into_iter()
                    .filter(|r| r.owner(column) == Some(identity.id.as_str()))
                    .collect();
                if owned.len() != fetched {
                    warn!(
                        table = %self.config.table(),
                        dropped = fetched - owned.len(),
                        "store returned rows owned by another user"
                    );
                }
                owned
            }
            None => records,
        };

        if records.is_empty() {
            LiveState::Empty
        } else {
            LiveState::Ready(Collection::new(records))
        }
    }

    async fn forward_changes<F: ChangeFeed>(self: Arc<Self>, feed: F) {
        let table = self.config.table();
        let mut feed = std::pin::pin!(feed);
        while let Some(item) = feed.next().await {
            match item {
                Ok(event) => {
                    debug!(%table, kind = ?event.kind, "change event");
                    // The receiver is dropped: nobody waits on event-driven fetches.
                    let _ = self.request(RefreshReason::ChangeEvent);
                }
                Err(err) => warn!(%table, error = %err, "change feed error"),
            }
        }
        info!(%table, "change feed ended");
    }

    /// Follow the provider's identity. Boxed so that re-activation, which
    /// spawns a new watcher, has a nameable future type.
    fn watch_session(
        self: Arc<Self>,
        generation: u64,
        user: UserId,
        mut identity_rx: watch::Receiver<Option<Identity>>,
    ) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let table = self.config.table().clone();
            while identity_rx.changed().await.is_ok() {
                let next = identity_rx.borrow_and_update().clone();
                match next {
                    // Same user, new metadata.
                    Some(identity) if identity.id == user => continue,
                    Some(identity) => {
                        info!(%table, from = %user, to = %identity.id, "identity changed, re-activating");
                        let mut control = self.lock();
                        if control.generation != generation {
                            return;
                        }
                        self.teardown(&mut control);
                        self.state.send_replace(LiveState::Loading);
                        control.shown_for = None;

                        let inner = Arc::clone(&self);
                        let activation = tokio::spawn(async move { inner.activate().await });
                        control.tasks.push(activation.abort_handle());
                        return;
                    }
                    None => {
                        info!(%table, user = %user, "session lost");
                        let mut control = self.lock();
                        if control.generation != generation {
                            return;
                        }
                        self.teardown(&mut control);
                        self.state.send_replace(LiveState::Unauthenticated);
                        return;
                    }
                }
            }
            debug!(%table, "session provider closed its identity channel");
        })
    }

    fn teardown(&self, control: &mut Control) {
        control.active = false;
        control.generation += 1;
        control.identity = None;
        control.in_flight = false;
        control.pending = None;
        if let Some(driver) = control.driver.take() {
            driver.abort();
        }
        for task in control.tasks.drain(..) {
            task.abort();
        }
        for waiter in control
            .current_waiters
            .drain(..)
            .chain(control.next_waiters.drain(..))
        {
            let _ = waiter.send(());
        }
    }
}
