//! Process-local store, used when no database is configured and by the test suites.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{Revision, SessionEntity, Versioned},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

struct StoredSession {
    entity: SessionEntity,
    revision: u64,
}

#[derive(Default)]
struct Inner {
    sessions: DashMap<Uuid, StoredSession>,
    codes: DashMap<String, Uuid>,
}

/// [`SessionStore`] keeping every session in a concurrent map.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<Inner>,
}

impl MemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_now(&self, session: SessionEntity) -> StorageResult<Revision> {
        let code = session.code.to_uppercase();
        let id = session.id;

        match self.inner.codes.entry(code.clone()) {
            Entry::Occupied(_) => {
                return Err(StorageError::Conflict(format!("join code {code} is taken")));
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        match self.inner.sessions.entry(id) {
            Entry::Occupied(_) => {
                self.inner.codes.remove(&code);
                Err(StorageError::Conflict(format!("session {id} already exists")))
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredSession {
                    entity: session,
                    revision: 1,
                });
                Ok(Revision(1.to_string()))
            }
        }
    }

    fn commit_now(&self, session: SessionEntity, expected: Revision) -> StorageResult<Revision> {
        let id = session.id;
        let mut stored = self
            .inner
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StorageError::Missing(format!("session {id} no longer exists")))?;

        if stored.revision.to_string() != expected.0 {
            return Err(StorageError::Conflict(format!(
                "session {id} moved from revision {expected} to {}",
                stored.revision
            )));
        }

        stored.revision += 1;
        stored.entity = session;
        Ok(Revision(stored.revision.to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn insert(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.insert_now(session) })
    }

    fn load(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store.inner.sessions.get(&id).map(|stored| Versioned {
                value: stored.entity.clone(),
                revision: Revision(stored.revision.to_string()),
            }))
        })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .codes
                .get(&code.to_uppercase())
                .map(|id| *id.value()))
        })
    }

    fn commit(
        &self,
        session: SessionEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.commit_now(session, expected) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::tests::lobby_with_players;

    fn entity() -> SessionEntity {
        SessionEntity::from(&lobby_with_players(2))
    }

    #[tokio::test]
    async fn commit_requires_the_read_revision() {
        let store = MemorySessionStore::new();
        let session = entity();
        let first = store.insert(session.clone()).await.unwrap();

        let loaded = store.load(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.revision, first);

        let second = store.commit(session.clone(), first.clone()).await.unwrap();
        assert_ne!(second, first);

        let stale = store.commit(session.clone(), first).await.unwrap_err();
        assert!(matches!(stale, StorageError::Conflict(_)));
        assert!(stale.is_transient());
    }

    #[tokio::test]
    async fn codes_are_unique_and_case_insensitive() {
        let store = MemorySessionStore::new();
        let session = entity();
        store.insert(session.clone()).await.unwrap();

        let found = store.find_by_code("abcdef".into()).await.unwrap();
        assert_eq!(found, Some(session.id));

        let mut clash = entity();
        clash.code = "abcdef".into();
        let err = store.insert(clash).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_id_releases_the_new_code() {
        let store = MemorySessionStore::new();
        let session = entity();
        store.insert(session.clone()).await.unwrap();

        let mut same_id = session.clone();
        same_id.code = "ZZZZZZ".into();
        assert!(store.insert(same_id).await.is_err());
        assert_eq!(store.find_by_code("ZZZZZZ".into()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_session_loads_as_none() {
        let store = MemorySessionStore::new();
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn committing_a_vanished_session_is_not_retried() {
        let store = MemorySessionStore::new();
        let err = store
            .commit(entity(), Revision("1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Missing(_)));
        assert!(!err.is_transient());
    }
}
