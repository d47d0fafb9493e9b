//! An in-memory session store for `gateau_session`, geared towards testing and local development.
use jiff::Timestamp;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;

use gateau_session::{
    SessionId,
    store::{
        SessionRecord, SessionRecordRef, SessionStorageBackend,
        errors::{DestroyError, LoadError, SaveError},
    },
};

#[derive(Clone)]
/// An in-memory session store.
///
/// # Limitations
///
/// This store won't persist data between server restarts.
/// It also won't synchronize data between multiple server instances.
/// It is primarily intended for testing and local development.
pub struct InMemorySessionStore(Arc<Mutex<HashMap<SessionId, StoreRecord>>>);

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct StoreRecord {
    data: serde_json::Map<String, serde_json::Value>,
    created_at: Timestamp,
    deadline: Option<Timestamp>,
}

impl StoreRecord {
    fn is_stale(&self, ttl: Option<Duration>) -> bool {
        let deadline = self
            .deadline
            .or_else(|| ttl.map(|ttl| self.created_at + ttl));
        deadline.is_some_and(|deadline| deadline <= Timestamp::now())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySessionStore {
    /// Creates a new (empty) in-memory session store.
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Remove all expired records from the store.
    ///
    /// Stale records are already invisible to [`get`][SessionStorageBackend::get];
    /// this reclaims the memory they occupy. Returns the number of records
    /// removed.
    pub async fn evict_expired(&self) -> usize {
        let mut guard = self.0.lock().await;
        let now = Timestamp::now();
        let stale_ids: Vec<SessionId> = guard
            .iter()
            .filter(|(_, record)| record.deadline.is_some_and(|deadline| deadline <= now))
            .map(|(id, _)| id.clone())
            .collect();
        let num_evicted = stale_ids.len();
        for id in stale_ids {
            guard.remove(&id);
        }
        num_evicted
    }
}

#[async_trait::async_trait]
impl SessionStorageBackend for InMemorySessionStore {
    /// Loads an existing session record from the store using the provided ID.
    #[tracing::instrument(name = "Load session record", level = tracing::Level::TRACE, skip_all)]
    async fn get(
        &self,
        id: &SessionId,
        ttl: Option<Duration>,
    ) -> Result<Option<SessionRecord>, LoadError> {
        let guard = self.0.lock().await;
        let outcome = guard
            .get(id)
            .filter(|record| !record.is_stale(ttl))
            .map(|record| SessionRecord {
                data: record.data.clone(),
                created_at: record.created_at,
            });
        Ok(outcome)
    }

    /// Writes a session record to the store against the provided ID.
    ///
    /// It overwrites any existing record with the provided one.
    #[tracing::instrument(name = "Write session record", level = tracing::Level::TRACE, skip_all)]
    async fn set(
        &self,
        id: &SessionId,
        record: SessionRecordRef<'_>,
        ttl: Option<Duration>,
    ) -> Result<(), SaveError> {
        let mut guard = self.0.lock().await;
        guard.insert(
            id.clone(),
            StoreRecord {
                data: record.data.into_owned(),
                created_at: record.created_at,
                deadline: ttl.map(|ttl| Timestamp::now() + ttl),
            },
        );
        Ok(())
    }

    /// Deletes a session record from the store using the provided ID.
    ///
    /// Deleting a record that doesn't exist is not an error.
    #[tracing::instrument(name = "Delete session record", level = tracing::Level::TRACE, skip_all)]
    async fn destroy(&self, id: &SessionId) -> Result<(), DestroyError> {
        self.0.lock().await.remove(id);
        Ok(())
    }
}
