use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoCodeProjection, MongoSessionDocument, doc_id},
};
use crate::dao::{
    models::{Revision, SessionEntity, Versioned},
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const DUPLICATE_KEY: i32 = 11000;

/// [`SessionStore`] keeping one document per session with an integer revision.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn is_decode_failure(err: &MongoError) -> bool {
    matches!(err.kind.as_ref(), ErrorKind::BsonDeserialization(_))
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_code_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        self.collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "code",
                source,
            })?;
        Ok(())
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<Revision> {
        let id = session.id;
        let document = MongoSessionDocument::new(session, 1);
        match self.collection().await.insert_one(&document).await {
            Ok(_) => Ok(Revision(document.revision.to_string())),
            Err(source) if is_duplicate_key(&source) => Err(MongoDaoError::Conflict {
                id,
                reason: "session id or join code already taken",
            }),
            Err(source) => Err(MongoDaoError::InsertSession { id, source }),
        }
    }

    async fn load_session(&self, id: Uuid) -> MongoResult<Option<Versioned<SessionEntity>>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| {
                if is_decode_failure(&source) {
                    MongoDaoError::DecodeSession {
                        id,
                        reason: source.to_string(),
                    }
                } else {
                    MongoDaoError::LoadSession { id, source }
                }
            })?;

        Ok(document.map(|doc| Versioned {
            revision: Revision(doc.revision.to_string()),
            value: doc.session,
        }))
    }

    async fn find_code(&self, code: String) -> MongoResult<Option<Uuid>> {
        let code = code.to_uppercase();
        let database = {
            let guard = self.inner.state.read().await;
            guard.database.clone()
        };
        let projection = database
            .collection::<MongoCodeProjection>(SESSION_COLLECTION_NAME)
            .find_one(doc! {"code": &code})
            .projection(doc! {"_id": 1})
            .await
            .map_err(|source| MongoDaoError::FindCode {
                code: code.clone(),
                source,
            })?;

        Ok(projection.and_then(|doc| Uuid::parse_str(&doc.id).ok()))
    }

    async fn commit_session(
        &self,
        session: SessionEntity,
        expected: Revision,
    ) -> MongoResult<Revision> {
        let id = session.id;
        let expected = expected
            .0
            .parse::<i64>()
            .map_err(|_| MongoDaoError::Conflict {
                id,
                reason: "revision token is not a mongo revision",
            })?;
        let document = MongoSessionDocument::new(session, expected + 1);

        let result = self
            .collection()
            .await
            .replace_one(doc! {"_id": id.to_string(), "revision": expected}, &document)
            .await
            .map_err(|source| MongoDaoError::CommitSession { id, source })?;

        if result.matched_count == 0 {
            return Err(MongoDaoError::Conflict {
                id,
                reason: "stored revision moved",
            });
        }
        Ok(Revision(document.revision.to_string()))
    }
}

impl SessionStore for MongoSessionStore {
    fn insert(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn load(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let store = self.clone();
        Box::pin(async move { store.load_session(id).await.map_err(Into::into) })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.find_code(code).await.map_err(Into::into) })
    }

    fn commit(
        &self,
        session: SessionEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .commit_session(session, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
