use crate::SessionId;
use errors::{DestroyError, LoadError, SaveError};
use jiff::Timestamp;
use serde_json::{Map, Value};
use std::{borrow::Cow, sync::Arc, time::Duration};

/// Where session records are stored when sessions are store-backed.
///
/// It is a thin wrapper
/// [around your chosen storage backend implementation][`SessionStorageBackend`],
/// removing the need to specify the concrete type of the storage backend
/// everywhere in your code.
#[derive(Debug, Clone)]
pub struct SessionStore(Arc<dyn SessionStorageBackend>);

impl SessionStore {
    /// Creates a new session store using the provided backend.
    pub fn new<Backend>(backend: Backend) -> Self
    where
        Backend: SessionStorageBackend + 'static,
    {
        Self(Arc::new(backend))
    }

    /// Loads an existing session record from the store using the provided ID.
    ///
    /// If a session with the given ID exists and hasn't outlived `ttl`, it is
    /// returned. Otherwise `None` is returned.
    pub async fn get(
        &self,
        id: &SessionId,
        ttl: Option<Duration>,
    ) -> Result<Option<SessionRecord>, LoadError> {
        self.0.get(id, ttl).await
    }

    /// Writes a session record to the store against the provided ID.
    ///
    /// It overwrites any existing record with the provided one.
    pub async fn set(
        &self,
        id: &SessionId,
        record: SessionRecordRef<'_>,
        ttl: Option<Duration>,
    ) -> Result<(), SaveError> {
        self.0.set(id, record, ttl).await
    }

    /// Deletes a session record from the store using the provided ID.
    ///
    /// Deleting a record that doesn't exist is not an error.
    pub async fn destroy(&self, id: &SessionId) -> Result<(), DestroyError> {
        self.0.destroy(id).await
    }
}

#[async_trait::async_trait]
/// The interface of a session storage backend.
pub trait SessionStorageBackend: std::fmt::Debug + Send + Sync {
    /// Loads an existing session record from the store using the provided ID.
    ///
    /// `ttl` is the maximum age configured for sessions: records older than
    /// `ttl` must be treated as missing. A `None` ttl means records never
    /// expire on age alone.
    async fn get(
        &self,
        id: &SessionId,
        ttl: Option<Duration>,
    ) -> Result<Option<SessionRecord>, LoadError>;

    /// Writes a session record to the store against the provided ID.
    ///
    /// It overwrites any existing record with the provided one.
    async fn set(
        &self,
        id: &SessionId,
        record: SessionRecordRef<'_>,
        ttl: Option<Duration>,
    ) -> Result<(), SaveError>;

    /// Deletes a session record from the store using the provided ID.
    ///
    /// Deleting a record that doesn't exist is not an error.
    async fn destroy(&self, id: &SessionId) -> Result<(), DestroyError>;
}

/// Builds a [`SessionStore`] scoped to a single request.
///
/// Use this instead of a shared [`SessionStore`] when the storage medium
/// hangs off the request itself, e.g. a per-request database connection
/// stashed in the request extensions.
pub trait ContextStoreFactory: std::fmt::Debug + Send + Sync {
    /// Build the store for the current request.
    ///
    /// `extensions` are the incoming request's extensions, giving access to
    /// whatever request-scoped state the surrounding application attached.
    fn for_request(&self, extensions: &http::Extensions) -> SessionStore;
}

/// How the middleware was configured to reach a store, resolved once at setup
/// so the session itself never branches on the store shape.
#[derive(Debug, Clone)]
pub(crate) enum StoreBinding {
    /// Sessions live entirely in the cookie.
    None,
    /// A single store shared across requests.
    Shared(SessionStore),
    /// A fresh store per request.
    PerRequest(Arc<dyn ContextStoreFactory>),
}

impl StoreBinding {
    pub(crate) fn bind(&self, extensions: &http::Extensions) -> Option<SessionStore> {
        match self {
            StoreBinding::None => None,
            StoreBinding::Shared(store) => Some(store.clone()),
            StoreBinding::PerRequest(factory) => Some(factory.for_request(extensions)),
        }
    }
}

/// The state of a session, as loaded from (or destined for) a store or cookie.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    /// The set of key-value pairs attached to the session.
    pub data: Map<String, Value>,
    /// When the session was first created.
    ///
    /// Kept outside `data` so that it never collides with application keys
    /// and never participates in change detection.
    pub created_at: Timestamp,
}

impl SessionRecord {
    /// A record with the provided data, created now.
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            created_at: Timestamp::now(),
        }
    }

    pub(crate) fn as_ref(&self) -> SessionRecordRef<'_> {
        SessionRecordRef {
            data: Cow::Borrowed(&self.data),
            created_at: self.created_at,
        }
    }
}

/// A borrowed view of a session record, used when writing to a store or
/// encoding a cookie payload.
#[derive(Debug)]
pub struct SessionRecordRef<'session> {
    /// The set of key-value pairs attached to the session.
    pub data: Cow<'session, Map<String, Value>>,
    /// When the session was first created.
    pub created_at: Timestamp,
}

/// Errors that can occur when interacting with a session storage backend.
pub mod errors {
    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::get`][super::SessionStorageBackend::get].
    pub enum LoadError {
        #[error("Failed to deserialize the session record.")]
        /// Failed to deserialize the session record.
        DeserializationError(#[from] serde_json::Error),
        /// Something else went wrong when loading the session record.
        #[error("Something went wrong when loading the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::set`][super::SessionStorageBackend::set].
    pub enum SaveError {
        #[error("Failed to serialize the session record.")]
        /// Failed to serialize the session record.
        SerializationError(#[from] serde_json::Error),
        /// Something else went wrong when writing the session record.
        #[error("Something went wrong when writing the session record.")]
        Other(#[source] anyhow::Error),
    }

    #[non_exhaustive]
    #[derive(Debug, thiserror::Error)]
    /// The error returned by [`SessionStorageBackend::destroy`][super::SessionStorageBackend::destroy].
    pub enum DestroyError {
        /// Something went wrong when deleting the session record.
        #[error("Something went wrong when deleting the session record.")]
        Other(#[source] anyhow::Error),
    }
}
