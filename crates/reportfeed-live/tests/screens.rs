//! Screen bindings against scripted collaborators.

mod common;

use std::sync::Arc;

use reportfeed_core::error::{AuthError, Error, InvalidInputError};
use reportfeed_core::{LocalStorage, MemoryStorage, SessionProvider};
use reportfeed_live::screens::{
    DEFAULT_TITLE, LoginScreen, ProfileSettings, ReportsFeed, SignupError, SignupForm,
    SignupScreen, TrendCapsule, UserProfile,
};
use reportfeed_live::LiveState;
use serde_json::json;

use common::{MockSession, MockStore, PASSWORD, record};

fn form(password: &str, confirm: &str) -> SignupForm {
    SignupForm {
        display_name: " Ayşe ".to_string(),
        email: "ayse@example.com".to_string(),
        password: password.to_string(),
        confirm_password: confirm.to_string(),
    }
}

#[tokio::test]
async fn remember_me_stores_and_forgets_credentials() {
    let session = Arc::new(MockSession::signed_out());
    let storage = Arc::new(MemoryStorage::new());
    let login = LoginScreen::new(session.clone(), storage.clone());

    assert!(login.prefill().await.unwrap().is_none());

    let signed_in = login.submit("ayse@example.com", PASSWORD, true).await.unwrap();
    assert_eq!(signed_in.identity.id.as_str(), "ayse");

    let remembered = login.prefill().await.unwrap().unwrap();
    assert_eq!(remembered.email(), "ayse@example.com");
    assert_eq!(remembered.password(), PASSWORD);

    login.submit("ayse@example.com", PASSWORD, false).await.unwrap();
    assert!(login.prefill().await.unwrap().is_none());
    assert_eq!(storage.get("userEmail").await.unwrap(), None);
    assert_eq!(storage.get("userPassword").await.unwrap(), None);
}

#[tokio::test]
async fn failed_login_leaves_remembered_credentials_alone() {
    let session = Arc::new(MockSession::signed_out());
    let storage = Arc::new(MemoryStorage::with_entries([
        ("userEmail", "old@example.com"),
        ("userPassword", "old-password"),
    ]));
    let login = LoginScreen::new(session, storage.clone());

    let err = login
        .submit("ayse@example.com", "wrong", true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials(_))));
    assert_eq!(
        storage.get("userEmail").await.unwrap().as_deref(),
        Some("old@example.com")
    );
}

#[tokio::test]
async fn login_rejects_blank_fields() {
    let login = LoginScreen::new(Arc::new(MockSession::signed_out()), MemoryStorage::new());
    let err = login.submit("  ", PASSWORD, false).await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidInput(InvalidInputError::Field { field: "email", .. })
    ));
}

#[tokio::test]
async fn signup_writes_profile_row() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_out());
    let signup = SignupScreen::new(store.clone(), session.clone());

    let created = signup.submit(&form(PASSWORD, PASSWORD)).await.unwrap();
    assert_eq!(created.identity.display_name.as_deref(), Some("Ayşe"));
    assert_eq!(store.insert_count(), 1);
}

#[tokio::test]
async fn signup_profile_failure_keeps_the_account() {
    let store = Arc::new(MockStore::new());
    store.fail_inserts(500);
    let session = Arc::new(MockSession::signed_out());
    let signup = SignupScreen::new(store.clone(), session.clone());

    match signup.submit(&form(PASSWORD, PASSWORD)).await {
        Err(SignupError::ProfileNotCreated { session: created, source }) => {
            assert_eq!(created.identity.id.as_str(), "ayse");
            assert!(matches!(source, Error::Write(_)));
        }
        other => panic!("expected ProfileNotCreated, got {other:?}"),
    }

    // Signed in as the new account; nothing was rolled back.
    let current = session.current_identity().await.unwrap().unwrap();
    assert_eq!(current.id.as_str(), "ayse");
}

#[tokio::test]
async fn signup_validation_happens_before_any_call() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_out());
    let signup = SignupScreen::new(store.clone(), session.clone());

    let err = signup.submit(&form(PASSWORD, "different")).await.unwrap_err();
    assert!(matches!(
        err,
        SignupError::Account(Error::InvalidInput(InvalidInputError::Field {
            field: "confirm_password",
            ..
        }))
    ));

    let err = signup.submit(&form("abc", "abc")).await.unwrap_err();
    assert!(matches!(
        err,
        SignupError::Account(Error::Auth(AuthError::WeakPassword(_)))
    ));
    assert_eq!(store.insert_count(), 0);
}

#[tokio::test]
async fn reports_feed_creates_with_default_title() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_in("u1"));
    let feed = ReportsFeed::new(store.clone(), session.clone()).unwrap();
    feed.live().activate().await;
    assert_eq!(feed.live().state(), LiveState::Empty);

    let report = feed.create_report(None, "  quarterly numbers \n").await.unwrap();
    assert_eq!(report.title(), DEFAULT_TITLE);
    assert_eq!(report.body(), "quarterly numbers");
    assert_eq!(report.user_id.as_deref(), Some("u1"));

    let listed = feed.reports().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, report.id);
}

#[tokio::test]
async fn blank_report_is_rejected_without_store_call() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_in("u1"));
    let feed = ReportsFeed::new(store.clone(), session).unwrap();

    let err = feed.create_report(Some("Title"), "   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(store.insert_count(), 0);
}

#[tokio::test]
async fn trend_capsule_shows_latest_or_nothing() {
    let trend = |id: &str, minute: u32, text: &str| {
        reportfeed_core::Record::new(json!({
            "id": id,
            "user_id": "u1",
            "trends": text,
            "created_at": format!("2024-05-01T10:{minute:02}:00Z"),
        }))
        .unwrap()
    };

    let store = Arc::new(MockStore::with_rows(vec![
        trend("t1", 1, "older"),
        trend("t2", 2, "rising sentiment"),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let capsule = TrendCapsule::new(store.clone(), session.clone()).unwrap();
    capsule.live().activate().await;
    assert_eq!(capsule.latest().as_deref(), Some("rising sentiment"));

    store.set_rows(vec![trend("t3", 3, "   ")]);
    capsule.live().focus_regained().await;
    assert_eq!(capsule.latest(), None);

    store.set_rows(Vec::new());
    capsule.live().focus_regained().await;
    assert_eq!(capsule.latest(), None);
}

#[tokio::test]
async fn settings_rename_updates_identity_and_profile() {
    let store = Arc::new(MockStore::with_rows(vec![
        reportfeed_core::Record::new(json!({
            "id": "u1",
            "display_name": "Old",
            "email": "u1@example.com",
            "created_at": "2024-05-01T10:00:00Z",
        }))
        .unwrap(),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let settings = ProfileSettings::new(store.clone(), session.clone(), MemoryStorage::new());

    let err = settings.update_display_name("   ").await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let identity = settings.update_display_name("  New Name ").await.unwrap();
    assert_eq!(identity.display_name.as_deref(), Some("New Name"));
    assert_eq!(
        settings.load().await.unwrap().display_name.as_deref(),
        Some("New Name")
    );

    let profile: UserProfile = store.rows()[0].decode().unwrap();
    assert_eq!(profile.display_name.as_deref(), Some("New Name"));
}

#[tokio::test]
async fn settings_sign_out_forgets_credentials() {
    let store = Arc::new(MockStore::new());
    let session = Arc::new(MockSession::signed_in("u1"));
    let storage = Arc::new(MemoryStorage::with_entries([
        ("userEmail", "u1@example.com"),
        ("userPassword", PASSWORD),
    ]));
    let settings = ProfileSettings::new(store, session.clone(), storage.clone());

    settings.sign_out().await.unwrap();

    assert_eq!(session.sign_out_count(), 1);
    assert_eq!(storage.get("userEmail").await.unwrap(), None);
    assert!(matches!(
        settings.load().await,
        Err(Error::Auth(AuthError::NotAuthenticated))
    ));
}

#[tokio::test]
async fn screens_ignore_records_of_other_users() {
    let store = Arc::new(MockStore::with_rows(vec![
        record("mine", "u1", 1),
        record("theirs", "u2", 2),
    ]));
    let session = Arc::new(MockSession::signed_in("u1"));
    let feed = ReportsFeed::new(store, session).unwrap();
    feed.live().activate().await;

    let reports = feed.reports().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].id, "mine");
}
