/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{Revision, SessionEntity, Versioned};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Transactional persistence for whole session aggregates.
///
/// Writes are optimistic: every read hands out a [`Revision`], and [`commit`](Self::commit)
/// only succeeds while the stored revision still matches.
pub trait SessionStore: Send + Sync {
    /// Store a brand new session; `Conflict` when its id or join code is taken.
    fn insert(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>>;
    /// Read a session with its current revision.
    fn load(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>>;
    /// Resolve a join code (case-insensitive) to a session id.
    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// Replace the session if it is still at `expected`; `Conflict` otherwise.
    fn commit(
        &self,
        session: SessionEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection in place.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
