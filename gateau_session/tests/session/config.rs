use crate::fixtures::store;
use gateau_session::{
    ContextStoreFactory, SessionConfig, SessionMiddleware, SessionStore,
    cookie::{Key, SameSite},
};
use insta::assert_snapshot;
use std::time::Duration;

#[test]
fn every_field_has_a_default() {
    let config: SessionConfig = serde_json::from_str("{}").unwrap();

    assert_eq!(config.cookie.name, "session");
    assert_eq!(config.cookie.max_age, None);
    assert!(config.cookie.overwrite);
    assert!(config.cookie.signed);
    assert!(config.cookie.http_only);
    assert!(!config.cookie.secure);
    assert_eq!(config.cookie.domain, None);
    assert_eq!(config.cookie.path.as_deref(), Some("/"));
    assert_eq!(config.cookie.same_site, None);
    assert!(config.auto_commit);
    assert_eq!(config.prefix, None);
}

#[test]
fn max_age_accepts_human_readable_durations() {
    let config: SessionConfig =
        serde_json::from_str(r#"{"cookie": {"max_age": "1h"}}"#).unwrap();
    assert_eq!(config.cookie.max_age, Some(Duration::from_secs(3600)));
}

#[test]
fn maxage_is_accepted_as_an_alias() {
    let config: SessionConfig =
        serde_json::from_str(r#"{"cookie": {"maxage": "30m"}}"#).unwrap();
    assert_eq!(config.cookie.max_age, Some(Duration::from_secs(1800)));
}

#[test]
fn same_site_parses_case_insensitively() {
    let config: SessionConfig =
        serde_json::from_str(r#"{"cookie": {"same_site": "lax"}}"#).unwrap();
    assert_eq!(config.cookie.same_site, Some(SameSite::Lax));
}

#[derive(Debug)]
struct FreshStorePerRequest;

impl ContextStoreFactory for FreshStorePerRequest {
    fn for_request(&self, _extensions: &http::Extensions) -> SessionStore {
        store()
    }
}

#[test]
fn configuring_both_store_shapes_fails_at_build_time() {
    let err = SessionMiddleware::builder(SessionConfig::default())
        .signing_key(Key::generate())
        .store(store())
        .context_store(FreshStorePerRequest)
        .build()
        .unwrap_err();
    assert_snapshot!(
        err,
        @"Both a shared session store and a per-request store factory were configured. Configure exactly one of the two."
    );
}

#[test]
fn signing_requires_a_key() {
    let err = SessionMiddleware::builder(SessionConfig::default())
        .build()
        .unwrap_err();
    assert_snapshot!(
        err,
        @"The session cookie is configured to be signed, but no signing key was provided. Provide one via `SessionMiddlewareBuilder::signing_key`, or disable signing explicitly."
    );
}

#[test]
fn disabling_signing_lifts_the_key_requirement() {
    let mut config = SessionConfig::default();
    config.cookie.signed = false;
    SessionMiddleware::builder(config).build().unwrap();
}
