use crate::IncomingSession;
use crate::SessionId;
use crate::config::SessionHooks;
use crate::store_::{SessionRecord, SessionStore};
use biscotti::{RemovalCookie, ResponseCookie};
use errors::{CommitError, InvalidAssignmentError};
use jiff::Timestamp;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::SessionConfig;

/// The session attached to the incoming request.
///
/// A session is a mutable bag of JSON key-value pairs, loaded before your
/// handlers run and written back after they return. Where it is written
/// depends on how the middleware was configured: into the cookie itself, or
/// into an external store with only the session id travelling in the cookie.
///
/// Nothing is written unless the state actually changed: at commit time the
/// live state is compared against the state the request arrived with.
pub struct Session {
    config: Arc<SessionConfig>,
    hooks: SessionHooks,
    store: Option<SessionStore>,
    external_key: Option<SessionId>,
    /// The state this request arrived with. Never exposed, never mutated:
    /// it only exists to decide, at commit time, whether anything changed.
    snapshot: Option<SessionRecord>,
    value: Option<SessionRecord>,
    /// Set when the handler explicitly discarded the incoming state. A
    /// session recreated afterwards must not inherit its creation time.
    discarded: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // No session id nor state in the output, they could end up in logs.
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

impl Session {
    /// Create a new session for an incoming request.
    ///
    /// `store` must be `Some` for store-backed sessions and `None` for
    /// cookie-backed ones. For a store-backed session built from an
    /// [`IncomingSession::ExternalKey`], call [`Session::init_from_external`]
    /// before reading from it.
    pub fn new(
        config: &Arc<SessionConfig>,
        hooks: &SessionHooks,
        store: Option<&SessionStore>,
        incoming: Option<IncomingSession>,
    ) -> Self {
        let mut session = Self {
            config: Arc::clone(config),
            hooks: hooks.clone(),
            store: store.cloned(),
            external_key: None,
            snapshot: None,
            value: None,
            discarded: false,
        };
        match incoming {
            Some(IncomingSession::Record(record)) => {
                session.snapshot = Some(record.clone());
                session.value = Some(record);
            }
            Some(IncomingSession::ExternalKey(id)) => {
                session.external_key = Some(id);
            }
            None => {}
        }
        session
    }

    /// Load the session record from the external store, using the key carried
    /// by the incoming cookie.
    ///
    /// If the record is missing or has outlived the configured maximum age,
    /// the session starts empty and the stale key is discarded: a later write
    /// will mint a fresh id.
    ///
    /// Store failures propagate: a request that cannot load its session should
    /// fail before handlers run, not silently lose state.
    pub async fn init_from_external(&mut self) -> Result<(), crate::store::errors::LoadError> {
        let (Some(store), Some(key)) = (&self.store, &self.external_key) else {
            return Ok(());
        };
        match store.get(key, self.config.cookie.max_age).await? {
            Some(record) => {
                self.snapshot = Some(record.clone());
                self.value = Some(record);
            }
            None => {
                self.external_key = None;
            }
        }
        Ok(())
    }

    /// Get the value associated with `key`, deserialized into `T`.
    ///
    /// If the key is not found, `None` is returned.
    /// If the value is found, but it cannot be deserialized into the expected type, an error is returned.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.get_value(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }

    /// Get the raw JSON value associated with `key`.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.value.as_ref().and_then(|value| value.data.get(key))
    }

    /// The whole session state, if the session exists.
    pub fn value(&self) -> Option<&Map<String, Value>> {
        self.value.as_ref().map(|value| &value.data)
    }

    /// Set the value associated with `key`, serializing it to JSON.
    ///
    /// If the session didn't exist yet, this first write brings it into
    /// existence. The previous value for `key`, if any, is returned.
    pub fn insert<T: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, serde_json::Error> {
        let value = serde_json::to_value(value)?;
        Ok(self.value_or_init().data.insert(key.into(), value))
    }

    /// Remove the value associated with `key`, returning it if it was there.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.value
            .as_mut()
            .and_then(|value| value.data.remove(key))
    }

    /// Replace the whole session state.
    ///
    /// A JSON object replaces the state, `null` destroys the session, and
    /// anything else is rejected.
    pub fn set_value(&mut self, new: Value) -> Result<(), InvalidAssignmentError> {
        match new {
            Value::Null => {
                self.destroy();
                Ok(())
            }
            Value::Object(data) => {
                let created_at = self.creation_time().unwrap_or_else(Timestamp::now);
                self.value = Some(SessionRecord { data, created_at });
                Ok(())
            }
            other => Err(InvalidAssignmentError {
                found: json_type_name(&other),
            }),
        }
    }

    /// Destroy the session.
    ///
    /// At commit time, the external record (if any) is deleted and the client
    /// receives a removal cookie. Destroying a session that never existed is
    /// a no-op: nothing is emitted at all.
    pub fn destroy(&mut self) {
        self.value = None;
        self.discarded = true;
    }

    /// Whether the session currently holds no state.
    pub fn is_empty(&self) -> bool {
        self.value
            .as_ref()
            .is_none_or(|value| value.data.is_empty())
    }

    /// When the session was first created, if it exists.
    pub fn created_at(&self) -> Option<Timestamp> {
        self.value.as_ref().map(|value| value.created_at)
    }

    /// The key under which the session is stored externally, if any.
    ///
    /// `None` for cookie-backed sessions and for store-backed sessions that
    /// haven't been written yet.
    pub fn external_key(&self) -> Option<&SessionId> {
        self.external_key.as_ref()
    }

    /// The configuration this session operates under.
    pub fn options(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn config(&self) -> &Arc<SessionConfig> {
        &self.config
    }

    /// Write the session back, if needed.
    ///
    /// The live state is compared against the state the request arrived with:
    ///
    /// - unchanged (or never existed): nothing is emitted;
    /// - changed or newly created: the state is persisted and a session cookie
    ///   is returned;
    /// - destroyed: the external record is deleted and a removal cookie is
    ///   returned.
    ///
    /// Committing twice is safe: the second call sees an unchanged session.
    pub async fn commit(&mut self) -> Result<Option<ResponseCookie<'static>>, CommitError> {
        let Some(value) = &self.value else {
            if self.snapshot.is_none() {
                return Ok(None);
            }
            if let (Some(store), Some(key)) = (&self.store, &self.external_key) {
                store.destroy(key).await?;
            }
            self.snapshot = None;
            self.external_key = None;
            return Ok(Some(self.removal_cookie()));
        };

        if let Some(snapshot) = &self.snapshot {
            // `created_at` is deliberately left out: bookkeeping metadata
            // must not force a write-back on its own.
            if value.data == snapshot.data {
                return Ok(None);
            }
        }

        let cookie_value = match &self.store {
            None => self.hooks.codec.encode(value.as_ref())?,
            Some(store) => {
                let id = match &self.external_key {
                    Some(id) => id.clone(),
                    None => self.hooks.id_generator.generate()?,
                };
                store
                    .set(&id, value.as_ref(), self.config.cookie.max_age)
                    .await?;
                let cookie_value = id.as_str().to_owned();
                self.external_key = Some(id);
                cookie_value
            }
        };
        let cookie = self.response_cookie(cookie_value);
        self.snapshot = self.value.clone();
        Ok(Some(cookie))
    }

    fn creation_time(&self) -> Option<Timestamp> {
        if let Some(value) = &self.value {
            return Some(value.created_at);
        }
        if self.discarded {
            // The incoming state was explicitly thrown away: a session
            // recreated from here starts a life of its own.
            return None;
        }
        self.snapshot.as_ref().map(|snapshot| snapshot.created_at)
    }

    fn value_or_init(&mut self) -> &mut SessionRecord {
        let created_at = self.creation_time().unwrap_or_else(Timestamp::now);
        self.value.get_or_insert_with(|| SessionRecord {
            data: Map::new(),
            created_at,
        })
    }

    fn removal_cookie(&self) -> ResponseCookie<'static> {
        let cookie_config = &self.config.cookie;
        let mut cookie = RemovalCookie::new(cookie_config.name.clone());
        if let Some(domain) = cookie_config.domain.as_deref() {
            cookie = cookie.set_domain(domain.to_owned());
        }
        if let Some(path) = cookie_config.path.as_deref() {
            cookie = cookie.set_path(path.to_owned());
        }
        cookie.into()
    }

    fn response_cookie(&self, value: String) -> ResponseCookie<'static> {
        let cookie_config = &self.config.cookie;
        let mut cookie = ResponseCookie::new(cookie_config.name.clone(), value);
        if let Some(domain) = cookie_config.domain.as_deref() {
            cookie = cookie.set_domain(domain.to_owned());
        }
        if let Some(path) = cookie_config.path.as_deref() {
            cookie = cookie.set_path(path.to_owned());
        }
        if let Some(same_site) = cookie_config.same_site {
            cookie = cookie.set_same_site(same_site);
        }
        if cookie_config.secure {
            cookie = cookie.set_secure(true);
        }
        if cookie_config.http_only {
            cookie = cookie.set_http_only(true);
        }
        if let Some(max_age) = cookie_config.max_age {
            cookie = cookie.set_max_age(max_age.try_into().unwrap_or(time::Duration::MAX));
        }
        cookie
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A cloneable handle to the [`Session`] attached to the current request.
///
/// The middleware stores a handle in the request extensions; handlers retrieve
/// it via [`RequestSessionExt::session`][crate::RequestSessionExt::session]
/// and lock it to read or mutate the session. The middleware keeps its own
/// clone to commit the session after the handlers are done.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}

impl SessionHandle {
    /// Wrap a session into a shareable handle.
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    /// Acquire the session for reading or writing.
    ///
    /// The request is processed sequentially, so the lock is uncontended in
    /// practice; it only exists to share the session between the handler and
    /// the middleware's commit step.
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().await
    }

    /// The configuration the session operates under.
    pub async fn options(&self) -> Arc<SessionConfig> {
        Arc::clone(self.0.lock().await.config())
    }
}

/// Errors that can occur when manipulating or committing the session state.
pub mod errors {
    use crate::codec_::errors::EncodeError;
    use crate::id::errors::IdGenerationError;
    use crate::store_::errors::{DestroyError, SaveError};

    #[derive(Debug, thiserror::Error)]
    #[error("The session state must be a JSON object or `null`, but {found} was provided.")]
    /// The error returned by [`Session::set_value`][crate::Session::set_value]
    /// when the provided value is neither a JSON object nor `null`.
    pub struct InvalidAssignmentError {
        /// A human-readable description of the offending JSON type.
        pub found: &'static str,
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`Session::commit`][crate::Session::commit].
    pub enum CommitError {
        #[error("Failed to encode the session payload.")]
        /// Failed to encode the session payload.
        Encode(#[from] EncodeError),
        #[error("Failed to generate an id for a new session.")]
        /// Failed to generate an id for a new session.
        IdGeneration(#[from] IdGenerationError),
        #[error("Failed to write the session record to the store.")]
        /// Failed to write the session record to the store.
        Save(#[from] SaveError),
        #[error("Failed to delete the session record from the store.")]
        /// Failed to delete the session record from the store.
        Destroy(#[from] DestroyError),
        #[error(
            "Some characters in the `Set-Cookie` header value for the session cookie are not printable ASCII characters."
        )]
        /// The serialized session cookie is not a valid HTTP header value.
        InvalidHeaderValue {
            /// The invalid header value.
            invalid_header_value: String,
        },
    }
}
