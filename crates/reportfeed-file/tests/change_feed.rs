//! Change feed tests against a real directory.

use std::time::Duration;

use futures_util::StreamExt;
use tempfile::TempDir;

use reportfeed_core::{
    ChangeKind, Filter, Query, RemoteStore, Row, SessionProvider, SignUp, StoreUrl, TableName,
};
use reportfeed_file::FileBackend;

const WAIT: Duration = Duration::from_secs(5);

fn backend(dir: &TempDir) -> FileBackend {
    let url = StoreUrl::new(format!("file://{}", dir.path().display())).unwrap();
    FileBackend::new(dir.path(), url).with_hash_cost(4)
}

async fn signed_up(backend: &FileBackend, email: &str) -> String {
    let session = backend
        .sign_up(&SignUp {
            email: email.to_string(),
            password: "secret1".to_string(),
            display_name: "Test".to_string(),
        })
        .await
        .unwrap();
    session.identity.id.to_string()
}

#[tokio::test]
async fn insert_is_reported_to_subscriber() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir);
    let user = signed_up(&backend, "a@example.com").await;
    let table = TableName::new("Reports").unwrap();

    let mut feed = backend.subscribe_changes(&table, None).unwrap();

    let record = backend
        .insert(&table, &Row::empty().with("user_id", user.as_str()).with("report", "hi"))
        .await
        .unwrap();

    let event = tokio::time::timeout(WAIT, feed.next())
        .await
        .expect("no change event")
        .expect("feed ended")
        .unwrap();
    assert_eq!(event.table, table);
    assert_eq!(event.kind, ChangeKind::Insert);
    assert_eq!(event.record_id.as_ref(), Some(record.id()));
}

#[tokio::test]
async fn writes_before_subscribing_are_not_replayed() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir);
    let user = signed_up(&backend, "a@example.com").await;
    let table = TableName::new("Reports").unwrap();

    backend
        .insert(&table, &Row::empty().with("user_id", user.as_str()))
        .await
        .unwrap();

    let mut feed = backend.subscribe_changes(&table, None).unwrap();
    let second = backend
        .insert(&table, &Row::empty().with("user_id", user.as_str()))
        .await
        .unwrap();

    let event = tokio::time::timeout(WAIT, feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.record_id.as_ref(), Some(second.id()));
}

#[tokio::test]
async fn owner_filter_and_table_are_respected() {
    let dir = TempDir::new().unwrap();
    let alice_backend = backend(&dir);
    let alice = signed_up(&alice_backend, "alice@example.com").await;
    let bob_backend = backend(&dir);
    let bob = signed_up(&bob_backend, "bob@example.com").await;

    let reports = TableName::new("Reports").unwrap();
    let trends = TableName::new("trend_analyses").unwrap();

    let mut feed = alice_backend
        .subscribe_changes(&reports, Some(&Filter::eq("user_id", alice.as_str())))
        .unwrap();

    bob_backend
        .insert(&reports, &Row::empty().with("user_id", bob.as_str()))
        .await
        .unwrap();
    alice_backend
        .insert(&trends, &Row::empty().with("user_id", alice.as_str()))
        .await
        .unwrap();
    let mine = alice_backend
        .insert(&reports, &Row::empty().with("user_id", alice.as_str()))
        .await
        .unwrap();

    let event = tokio::time::timeout(WAIT, feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.table, reports);
    assert_eq!(event.record_id.as_ref(), Some(mine.id()));

    // The backends share one directory, so both see every row.
    let all = bob_backend.query(&Query::table(reports.clone())).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn update_is_reported() {
    let dir = TempDir::new().unwrap();
    let backend = backend(&dir);
    let user = signed_up(&backend, "a@example.com").await;
    let table = TableName::new("Reports").unwrap();

    let record = backend
        .insert(&table, &Row::empty().with("user_id", user.as_str()))
        .await
        .unwrap();

    let mut feed = backend.subscribe_changes(&table, None).unwrap();
    backend
        .update(&table, record.id(), &Row::empty().with("title", "renamed"))
        .await
        .unwrap();

    let event = tokio::time::timeout(WAIT, feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ChangeKind::Update);
}
