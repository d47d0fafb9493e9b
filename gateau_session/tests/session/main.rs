use std::time::Duration;

use assertions::is_removal_cookie;
use fixtures::{SessionFixture, failing_store, session, shared_config, spy_store, store};
use googletest::assert_that;
use googletest::prelude::{eq, len, none};
use helpers::decode_payload;
use serde_json::json;

mod config;
mod operations;

#[tokio::test]
async fn untouched_fresh_session_emits_nothing() {
    let (store, call_tracker) = spy_store();
    let mut session = session(&shared_config(), Some(&store), None);

    let cookie = session.commit().await.unwrap();
    assert_that!(cookie, none());

    call_tracker.assert_store_was_untouched().await;
}

#[tokio::test]
async fn unchanged_loaded_session_is_not_written_back() {
    let (store, call_tracker) = spy_store();
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let incoming = fixture.setup(&store).await;

    let mut session = session(&shared_config(), Some(&store), Some(incoming));
    session.init_from_external().await.unwrap();
    assert_eq!(session.get_value("user"), Some(&json!("alice")));

    let cookie = session.commit().await.unwrap();
    assert_that!(cookie, none());

    // Loaded once, never written.
    let oplog = call_tracker.operation_log().await;
    assert_that!(oplog, len(eq(1)));
    assert_eq!(oplog[0], format!("get {}", fixture.id));
}

#[tokio::test]
async fn key_order_does_not_make_a_session_dirty() {
    let fixture = SessionFixture {
        data: json!({"a": 1, "b": 2}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let mut session = session(&shared_config(), None, Some(fixture.as_incoming_record()));

    session.set_value(json!({"b": 2, "a": 1})).unwrap();

    let cookie = session.commit().await.unwrap();
    assert_that!(cookie, none());
}

#[tokio::test]
async fn first_write_creates_the_record_and_the_cookie() {
    let (store, call_tracker) = spy_store();
    let mut session = session(&shared_config(), Some(&store), None);

    session.insert("user", "alice").unwrap();
    let cookie = session.commit().await.unwrap().unwrap();

    // The cookie carries the bare id, nothing else.
    let id = session.external_key().unwrap();
    assert_eq!(cookie.value(), id.as_str());

    let record = store.get(id, None).await.unwrap().unwrap();
    assert_eq!(record.data["user"], "alice");
    assert_eq!(
        call_tracker.operation_log().await,
        vec![format!("set {id}")]
    );
}

#[tokio::test]
async fn cookie_backed_write_emits_the_encoded_payload() {
    let mut session = session(&shared_config(), None, None);

    session.insert("user", "alice").unwrap();
    let cookie = session.commit().await.unwrap().unwrap();

    let payload = decode_payload(cookie.value());
    assert_eq!(payload["1"]["user"], "alice");
    // The creation timestamp travels outside the user data.
    assert!(payload["0"].is_i64());
}

#[tokio::test]
async fn rewriting_identical_data_is_not_a_write() {
    let (store, call_tracker) = spy_store();
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let incoming = fixture.setup(&store).await;

    let mut session = session(&shared_config(), Some(&store), Some(incoming));
    session.init_from_external().await.unwrap();
    call_tracker.reset_operation_log().await;

    session.set_value(json!({"user": "alice"})).unwrap();

    let cookie = session.commit().await.unwrap();
    assert_that!(cookie, none());
    call_tracker.assert_store_was_untouched().await;
}

#[tokio::test]
async fn destroying_an_existing_session_deletes_the_record_and_the_cookie() {
    let (store, call_tracker) = spy_store();
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let incoming = fixture.setup(&store).await;

    let mut session = session(&shared_config(), Some(&store), Some(incoming));
    session.init_from_external().await.unwrap();
    session.destroy();

    let cookie = session.commit().await.unwrap().unwrap();
    assert_that!(cookie, is_removal_cookie());

    assert!(store.get(&fixture.id, None).await.unwrap().is_none());
    assert!(
        call_tracker
            .operation_log()
            .await
            .contains(&format!("destroy {}", fixture.id))
    );
}

#[tokio::test]
async fn destroying_a_session_that_never_existed_emits_nothing() {
    let (store, call_tracker) = spy_store();
    let mut session = session(&shared_config(), Some(&store), None);

    session.insert("user", "alice").unwrap();
    session.destroy();

    let cookie = session.commit().await.unwrap();
    assert_that!(cookie, none());
    call_tracker.assert_store_was_untouched().await;
}

#[tokio::test]
async fn stale_records_are_discarded_and_later_writes_get_a_fresh_id() {
    let store = store();
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ttl: Some(Duration::ZERO),
        ..Default::default()
    };
    let incoming = fixture.setup(&store).await;

    let mut session = session(&shared_config(), Some(&store), Some(incoming));
    session.init_from_external().await.unwrap();

    // The stale record is invisible and its key has been dropped.
    assert!(session.value().is_none());
    assert!(session.external_key().is_none());

    session.insert("user", "bob").unwrap();
    let cookie = session.commit().await.unwrap().unwrap();
    assert_ne!(cookie.value(), fixture.id.as_str());
}

#[tokio::test]
async fn load_failures_propagate() {
    let store = failing_store();
    let fixture = SessionFixture::default();

    let mut session = session(
        &shared_config(),
        Some(&store),
        Some(gateau_session::IncomingSession::from_external_key(
            fixture.id.clone(),
        )),
    );
    session.init_from_external().await.unwrap_err();
}

#[tokio::test]
async fn save_failures_propagate() {
    let store = failing_store();
    let mut session = session(&shared_config(), Some(&store), None);

    session.insert("user", "alice").unwrap();
    session.commit().await.unwrap_err();
}

#[tokio::test]
async fn commit_is_idempotent() {
    let mut session = session(&shared_config(), None, None);

    session.insert("user", "alice").unwrap();
    assert!(session.commit().await.unwrap().is_some());

    // The second commit sees an unchanged session.
    assert_that!(session.commit().await.unwrap(), none());
}

#[tokio::test]
async fn session_debug_representation_does_not_leak_state() {
    let store = store();
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let incoming = fixture.setup(&store).await;
    let mut session = session(&shared_config(), Some(&store), Some(incoming));
    session.init_from_external().await.unwrap();

    let debug = format!("{session:?}");
    assert!(!debug.contains("alice"));
    assert!(!debug.contains(fixture.id.as_str()));
}
