use crate::fixtures::{SessionFixture, session, shared_config};
use insta::assert_snapshot;
use jiff::Timestamp;
use serde_json::{Value, json};
use std::time::Duration;

#[tokio::test]
async fn values_can_be_inserted_and_read_back() {
    let mut session = session(&shared_config(), None, None);

    session.insert("user", "alice").unwrap();
    session.insert("visits", 3).unwrap();

    assert_eq!(session.get::<String>("user").unwrap(), Some("alice".into()));
    assert_eq!(session.get::<u32>("visits").unwrap(), Some(3));
    assert_eq!(session.get_value("user"), Some(&json!("alice")));
}

#[tokio::test]
async fn missing_keys_read_as_none() {
    let session = session(&shared_config(), None, None);
    assert_eq!(session.get::<String>("user").unwrap(), None);
    assert!(session.get_value("user").is_none());
}

#[tokio::test]
async fn typed_reads_fail_on_a_type_mismatch() {
    let mut session = session(&shared_config(), None, None);
    session.insert("visits", 3).unwrap();
    assert!(session.get::<String>("visits").is_err());
}

#[tokio::test]
async fn removing_a_key_returns_its_value() {
    let mut session = session(&shared_config(), None, None);
    session.insert("user", "alice").unwrap();

    assert_eq!(session.remove("user"), Some(json!("alice")));
    assert!(session.get_value("user").is_none());
    assert_eq!(session.remove("user"), None);
}

#[tokio::test]
async fn a_session_springs_into_existence_on_first_write() {
    let mut session = session(&shared_config(), None, None);

    assert!(session.value().is_none());
    assert!(session.created_at().is_none());
    assert!(session.is_empty());

    session.insert("user", "alice").unwrap();

    assert!(session.value().is_some());
    assert!(session.created_at().is_some());
    assert!(!session.is_empty());
}

#[tokio::test]
async fn replacing_the_state_keeps_the_creation_time() {
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        ..Default::default()
    };
    let mut session = session(&shared_config(), None, Some(fixture.as_incoming_record()));

    session.set_value(json!({"user": "bob"})).unwrap();

    assert_eq!(session.created_at(), Some(fixture.created_at));
}

#[tokio::test]
async fn a_session_recreated_after_destroy_gets_a_fresh_creation_time() {
    let fixture = SessionFixture {
        data: json!({"user": "alice"}).as_object().unwrap().clone(),
        created_at: Timestamp::now() - Duration::from_secs(3600),
        ..Default::default()
    };
    let mut session = session(&shared_config(), None, Some(fixture.as_incoming_record()));

    session.destroy();
    session.insert("user", "bob").unwrap();

    // The old expiry horizon must not carry over to the new session.
    let created_at = session.created_at().unwrap();
    assert!(created_at > fixture.created_at);

    session.set_value(Value::Null).unwrap();
    session.set_value(json!({"user": "carol"})).unwrap();
    assert!(session.created_at().unwrap() > fixture.created_at);
}

#[tokio::test]
async fn assigning_null_destroys_the_session() {
    let mut session = session(&shared_config(), None, None);
    session.insert("user", "alice").unwrap();

    session.set_value(Value::Null).unwrap();

    assert!(session.value().is_none());
}

#[tokio::test]
async fn assigning_a_scalar_is_rejected() {
    let mut session = session(&shared_config(), None, None);

    let err = session.set_value(json!(42)).unwrap_err();
    assert_snapshot!(
        err,
        @"The session state must be a JSON object or `null`, but a number was provided."
    );

    let err = session.set_value(json!("yo")).unwrap_err();
    assert_snapshot!(
        err,
        @"The session state must be a JSON object or `null`, but a string was provided."
    );

    let err = session.set_value(json!([1, 2])).unwrap_err();
    assert_snapshot!(
        err,
        @"The session state must be a JSON object or `null`, but an array was provided."
    );
}

#[tokio::test]
async fn the_configuration_is_visible_through_the_session() {
    let session = session(&shared_config(), None, None);
    assert_eq!(session.options().cookie.name, "session");
    assert!(session.options().auto_commit);
}
