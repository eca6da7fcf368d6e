//! Live Query Controller behaviour against a scripted store.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use reportfeed_core::error::{AuthError, Error, StoreError};
use reportfeed_core::{
    AuthSession, Credentials, Filter, Identity, IdentityPatch, Result, Row, SessionProvider,
    SignUp, TableName,
};
use reportfeed_live::{LiveQuery, LiveQueryConfig, LiveState, RefreshReason};

use common::{MockSession, MockStore, eventually, identity, record, settle};

type Live = LiveQuery<Arc<MockStore>, Arc<MockSession>>;

fn reports() -> LiveQueryConfig {
    LiveQueryConfig::new(TableName::new("Reports").unwrap()).owned()
}

fn live(store: &Arc<MockStore>, session: &Arc<MockSession>) -> Arc<Live> {
    Arc::new(LiveQuery::new(store.clone(), session.clone(), reports()))
}

fn ids(state: &LiveState) -> Vec<String> {
    state
        .collection()
        .map(|c| c.iter().map(|r| r.id().to_string()).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn activation_fetches_owned_records_newest_first() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("old", "u1", 1),
        record("new", "u1", 9),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    assert!(live.state().is_loading());
    live.activate().await;

    assert_eq!(ids(&live.state()), ["new", "old"]);
    assert_eq!(store.query_count(), 1);
    assert_eq!(store.live_subscriptions(), 1);
    assert!(!live.is_busy());

    let query = store.last_query().unwrap();
    assert_eq!(query.filters, vec![Filter::eq("user_id", "u1")]);
}

#[tokio::test]
async fn activation_without_session_is_unauthenticated() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_out());
    let live = live(&store, &session);

    live.activate().await;

    assert_eq!(live.state(), LiveState::Unauthenticated);
    assert!(!live.is_active());
    assert_eq!(store.query_count(), 0);
    assert_eq!(store.live_subscriptions(), 0);
}

#[tokio::test]
async fn activating_twice_is_a_no_op() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    live.activate().await;
    live.activate().await;

    assert_eq!(store.query_count(), 1);
    assert_eq!(store.live_subscriptions(), 1);
}

#[tokio::test]
async fn overlapping_refreshes_collapse_into_one_follow_up() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    assert_eq!(store.query_count(), 1);

    let gate = store.hold();
    let first = tokio::spawn({
        let live = live.clone();
        async move { live.refresh(RefreshReason::PullToRefresh).await }
    });
    eventually(|| store.query_count() == 2).await;
    assert!(live.is_busy());

    let mut followers = Vec::new();
    for reason in [
        RefreshReason::ChangeEvent,
        RefreshReason::FocusRegained,
        RefreshReason::Manual,
    ] {
        let live = live.clone();
        followers.push(tokio::spawn(async move { live.refresh(reason).await }));
    }
    settle().await;
    assert_eq!(store.query_count(), 2, "no second query while one is in flight");

    store.set_rows(vec![record("a", "u1", 1), record("b", "u1", 2)]);
    gate.release();

    first.await.unwrap();
    for follower in followers {
        // Coalesced callers see the result of the follow-up fetch.
        let state = follower.await.unwrap();
        assert_eq!(ids(&state), ["b", "a"]);
    }
    settle().await;
    assert_eq!(store.query_count(), 3);
    assert!(!live.is_busy());
}

#[tokio::test]
async fn fetch_completing_after_deactivate_changes_nothing() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let gate = store.hold();
    let pending = tokio::spawn({
        let live = live.clone();
        async move { live.refresh(RefreshReason::PullToRefresh).await }
    });
    eventually(|| store.query_count() == 2).await;

    store.set_rows(vec![record("a", "u1", 1), record("late", "u1", 5)]);
    live.deactivate();

    // The waiting caller is released with the state as it was.
    let state = pending.await.unwrap();
    assert_eq!(ids(&state), ["a"]);

    gate.release();
    settle().await;
    assert_eq!(ids(&live.state()), ["a"]);
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn deactivate_is_idempotent_and_releases_the_subscription() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    let before = live.state();

    live.deactivate();
    live.deactivate();
    live.deactivate();

    eventually(|| store.live_subscriptions() == 0).await;
    assert_eq!(store.query_count(), 1);
    assert_eq!(live.state(), before);
    assert!(!live.is_active());

    // Inactive controllers serve the current state without store calls.
    let state = live.refresh(RefreshReason::Manual).await;
    assert_eq!(state, before);
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn dropping_the_controller_tears_it_down() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = LiveQuery::new(store.clone(), session.clone(), reports());
    live.activate().await;
    assert_eq!(store.live_subscriptions(), 1);

    drop(live);
    eventually(|| store.live_subscriptions() == 0).await;
}

#[tokio::test]
async fn one_change_event_causes_exactly_one_query() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    assert_eq!(store.query_count(), 1);

    store.emit("Reports");
    eventually(|| store.query_count() == 2).await;
    settle().await;
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn change_event_turns_empty_into_ready() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    assert_eq!(live.state(), LiveState::Empty);

    let mut states = live.watch();
    store.set_rows(vec![record("fresh", "u1", 3)]);
    store.emit("Reports");

    tokio::time::timeout(common::WAIT, states.wait_for(|s| matches!(s, LiveState::Ready(_))))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ids(&live.state()), ["fresh"]);
}

#[tokio::test]
async fn feed_errors_do_not_change_state() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    let before = live.state();

    store.emit_error();
    settle().await;

    assert_eq!(live.state(), before);
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn subscription_failure_still_fetches() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    store.fail_subscribe();
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    live.activate().await;

    assert_eq!(ids(&live.state()), ["a"]);
    assert!(live.is_active());
    let state = live.focus_regained().await;
    assert_eq!(ids(&state), ["a"]);
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn rows_of_other_users_never_reach_the_collection() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("mine", "u1", 1),
        record("theirs", "u2", 2),
        record("also-mine", "u1", 3),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    live.activate().await;

    let state = live.state();
    assert_eq!(ids(&state), ["also-mine", "mine"]);
    for r in state.collection().unwrap().iter() {
        assert_eq!(r.owner("user_id"), Some("u1"));
    }
}

#[tokio::test]
async fn only_foreign_rows_is_empty() {
    let store = Arc::new(MockStore::with_rows(vec![record("theirs", "u2", 2)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    live.activate().await;
    assert_eq!(live.state(), LiveState::Empty);
}

#[tokio::test]
async fn session_loss_mid_fetch_discards_the_result() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let gate = store.hold();
    let pending = tokio::spawn({
        let live = live.clone();
        async move { live.refresh(RefreshReason::PullToRefresh).await }
    });
    eventually(|| store.query_count() == 2).await;

    session.set_identity(None);
    eventually(|| live.state() == LiveState::Unauthenticated).await;

    gate.release();
    assert_eq!(pending.await.unwrap(), LiveState::Unauthenticated);
    settle().await;

    assert_eq!(live.state(), LiveState::Unauthenticated);
    assert!(!live.is_active());
    assert_eq!(store.live_subscriptions(), 0);
}

#[tokio::test]
async fn identity_change_reactivates_for_the_new_user() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("a", "u1", 1),
        record("b", "u2", 2),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    assert_eq!(ids(&live.state()), ["a"]);

    session.set_identity(Some(identity("u2")));
    eventually(|| ids(&live.state()) == ["b"]).await;

    assert_eq!(
        store.last_query().unwrap().filters,
        vec![Filter::eq("user_id", "u2")]
    );
    eventually(|| store.live_subscriptions() == 1).await;
    assert!(live.is_active());
}

#[tokio::test]
async fn metadata_update_does_not_reactivate() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let mut renamed = identity("u1");
    renamed.display_name = Some("Ayşe".to_string());
    session.set_identity(Some(renamed));
    settle().await;

    assert_eq!(store.query_count(), 1);
    assert_eq!(store.live_subscriptions(), 1);
}

#[tokio::test]
async fn failed_fetch_keeps_stale_records_until_next_success() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    store.fail_next_query("connection reset");
    let state = live.refresh(RefreshReason::PullToRefresh).await;
    match &state {
        LiveState::Error { message, stale } => {
            assert!(message.contains("connection reset"));
            assert_eq!(stale.as_ref().map(|c| c.len()), Some(1));
        }
        other => panic!("expected error state, got {other:?}"),
    }
    assert_eq!(ids(&state), ["a"]);

    let state = live.refresh(RefreshReason::PullToRefresh).await;
    assert!(matches!(state, LiveState::Ready(_)));
}

#[tokio::test]
async fn create_record_stamps_owner_and_refreshes() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let created = live
        .create_record(Row::empty().with("title", "t").with("report", "r"))
        .await
        .unwrap();

    assert_eq!(created.owner("user_id"), Some("u1"));
    let state = live.state();
    assert_eq!(state.collection().unwrap().first().unwrap().id(), created.id());
    assert_eq!(store.query_count(), 2);
}

#[tokio::test]
async fn create_record_cannot_spoof_owner() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);

    let created = live
        .create_record(Row::empty().with("user_id", "u2"))
        .await
        .unwrap();
    assert_eq!(created.owner("user_id"), Some("u1"));
}

#[tokio::test]
async fn create_record_requires_a_session() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_out());
    let live = live(&store, &session);

    let err = live.create_record(Row::empty()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::NotAuthenticated)));
    assert_eq!(store.insert_count(), 0);
}

#[tokio::test]
async fn rejected_insert_is_a_write_error() {
    let store = Arc::new(MockStore::new());
    store.fail_inserts(409);
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let err = live
        .create_record(Row::empty().with("title", "t"))
        .await
        .unwrap_err();
    match err {
        Error::Write(w) => {
            assert_eq!(w.table.as_str(), "Reports");
            assert!(matches!(w.source, StoreError::Rejected(ref p) if p.status == 409));
        }
        other => panic!("expected write error, got {other:?}"),
    }
    assert_eq!(store.query_count(), 1);
}

#[tokio::test]
async fn limit_is_forwarded() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("a", "u1", 1),
        record("b", "u1", 2),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let latest = LiveQuery::new(
        store.clone(),
        session.clone(),
        LiveQueryConfig::new(TableName::new("trend_analyses").unwrap())
            .owned()
            .limit(1),
    );

    latest.activate().await;
    assert_eq!(ids(&latest.state()), ["b"]);
    assert_eq!(store.last_query().unwrap().limit, Some(1));
}

#[tokio::test]
async fn reactivating_as_another_user_never_shows_the_previous_rows() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("a1", "u1", 1),
        record("b1", "u2", 2),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    assert_eq!(ids(&live.state()), ["a1"]);

    live.deactivate();
    session.set_identity(Some(identity("u2")));

    let gate = store.hold();
    store.fail_next_query("backend unavailable");
    let activation = tokio::spawn({
        let live = live.clone();
        async move { live.activate().await }
    });
    eventually(|| store.query_count() == 2).await;
    assert_eq!(live.state(), LiveState::Loading);

    gate.release();
    activation.await.unwrap();

    let state = live.state();
    assert!(state.is_error());
    assert!(ids(&state).is_empty(), "u2 was shown {:?}", ids(&state));
}

#[tokio::test]
async fn reactivating_as_the_same_user_keeps_rows_on_screen() {
    let store = Arc::new(MockStore::with_rows(vec![record("a1", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;
    live.deactivate();

    let gate = store.hold();
    let activation = tokio::spawn({
        let live = live.clone();
        async move { live.activate().await }
    });
    eventually(|| store.query_count() == 2).await;
    assert_eq!(ids(&live.state()), ["a1"]);

    gate.release();
    activation.await.unwrap();
    assert_eq!(ids(&live.state()), ["a1"]);
}

/// Signs out the moment the current identity has been read.
struct SignsOutAfterRead(Arc<MockSession>);

#[async_trait]
impl SessionProvider for SignsOutAfterRead {
    async fn current_identity(&self) -> Result<Option<Identity>> {
        let current = self.0.current_identity().await?;
        self.0.set_identity(None);
        Ok(current)
    }

    async fn sign_in(&self, credentials: Credentials) -> Result<AuthSession> {
        self.0.sign_in(credentials).await
    }

    async fn sign_up(&self, request: &SignUp) -> Result<AuthSession> {
        self.0.sign_up(request).await
    }

    async fn sign_out(&self) -> Result<()> {
        self.0.sign_out().await
    }

    async fn update_identity(&self, patch: &IdentityPatch) -> Result<Identity> {
        self.0.update_identity(patch).await
    }

    fn watch_identity(&self) -> watch::Receiver<Option<Identity>> {
        self.0.watch_identity()
    }
}

#[tokio::test]
async fn sign_out_during_activation_is_noticed() {
    let store = Arc::new(MockStore::with_rows(vec![record("a1", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = LiveQuery::new(store.clone(), SignsOutAfterRead(session.clone()), reports());

    live.activate().await;

    eventually(|| live.state() == LiveState::Unauthenticated).await;
    assert!(!live.is_active());
    eventually(|| store.live_subscriptions() == 0).await;
}

#[tokio::test]
async fn request_refresh_returns_before_the_fetch_settles() {
    let store = Arc::new(MockStore::with_rows(vec![record("a", "u1", 1)]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let live = live(&store, &session);
    live.activate().await;

    let gate = store.hold();
    assert!(live.request_refresh(RefreshReason::PullToRefresh));
    eventually(|| store.query_count() == 2).await;
    assert!(live.is_busy());
    assert_eq!(ids(&live.state()), ["a"]);

    store.set_rows(vec![record("a", "u1", 1), record("b", "u1", 2)]);
    gate.release();
    eventually(|| ids(&live.state()) == ["b", "a"]).await;

    live.deactivate();
    assert!(!live.request_refresh(RefreshReason::Manual));
    assert_eq!(store.query_count(), 2);
}
