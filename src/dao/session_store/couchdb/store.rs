use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use tracing::warn;
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::dao::{
    models::{Revision, SessionEntity, Versioned},
    session_store::SessionStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchCodeDocument, CouchSessionDocument, PutResponse, code_doc_id, session_doc_id},
};

/// [`SessionStore`] backed by a CouchDB database, using `_rev` for optimistic commits.
#[derive(Clone)]
pub struct CouchSessionStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchSessionStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorized(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let value = response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|source| CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    })?;
                serde_json::from_value(value).map(Some).map_err(|source| {
                    CouchDaoError::DeserializeValue {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document and return its new `_rev`; 409 becomes [`CouchDaoError::RevisionConflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<String>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            status if status.is_success() => response
                .json::<PutResponse>()
                .await
                .map(|body| body.rev)
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: doc_id.to_string(),
                    source,
                }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Remove `doc_id` at revision `rev`.
    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<()> {
        let path = format!("{doc_id}?rev={rev}");
        let response = self
            .request(Method::DELETE, &path)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() || status == StatusCode::NOT_FOUND => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }
}

impl SessionStore for CouchSessionStore {
    fn insert(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let reservation = CouchCodeDocument::new(&session.code, session.id);
            let reservation_rev = store
                .put_document(&reservation.id, &reservation)
                .await?;

            let doc = CouchSessionDocument::new(session, None);
            match store.put_document(&doc.id, &doc).await {
                Ok(rev) => Ok(Revision(rev)),
                Err(err) => {
                    if let Err(release_err) = store
                        .delete_document(&reservation.id, &reservation_rev)
                        .await
                    {
                        warn!(
                            code_doc = %reservation.id,
                            error = %release_err,
                            "failed to release join code after session insert failure"
                        );
                    }
                    Err(err.into())
                }
            }
        })
    }

    fn load(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<Versioned<SessionEntity>>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = session_doc_id(id);
            let maybe_doc = store.get_document::<CouchSessionDocument>(&doc_id).await?;
            Ok(maybe_doc.and_then(|doc| {
                doc.rev.map(|rev| Versioned {
                    value: doc.session,
                    revision: Revision(rev),
                })
            }))
        })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = code_doc_id(&code);
            let maybe_doc = store.get_document::<CouchCodeDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.session_id))
        })
    }

    fn commit(
        &self,
        session: SessionEntity,
        expected: Revision,
    ) -> BoxFuture<'static, StorageResult<Revision>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchSessionDocument::new(session, Some(expected.0));
            let rev = store.put_document(&doc.id, &doc).await?;
            Ok(Revision(rev))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .authorized(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        routing::put,
    };
    use serde_json::{Value, json};
    use tokio::net::TcpListener;

    use super::*;
    use crate::state::session::tests::lobby_with_players;

    type Deleted = Arc<Mutex<Vec<(String, String)>>>;

    async fn put_doc(Path((_db, doc)): Path<(String, String)>) -> (StatusCode, Json<Value>) {
        if doc.starts_with("code::") {
            (
                StatusCode::CREATED,
                Json(json!({ "ok": true, "id": doc, "rev": "1-code" })),
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "unknown_error" })),
            )
        }
    }

    async fn delete_doc(
        State(deleted): State<Deleted>,
        Path((_db, doc)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let rev = query.get("rev").cloned().unwrap_or_default();
        deleted.lock().unwrap().push((doc, rev));
        Json(json!({ "ok": true }))
    }

    #[tokio::test]
    async fn failed_session_write_releases_the_join_code() {
        let deleted = Deleted::default();
        let app = Router::new()
            .route("/{db}/{doc}", put(put_doc).delete(delete_doc))
            .with_state(deleted.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let store = CouchSessionStore {
            client: Client::new(),
            base_url: format!("http://{addr}").into(),
            database: "punchline".into(),
            auth: None,
        };
        let err = store
            .insert(SessionEntity::from(&lobby_with_players(2)))
            .await
            .unwrap_err();

        assert!(!err.is_transient());
        assert_eq!(
            *deleted.lock().unwrap(),
            vec![("code::ABCDEF".to_string(), "1-code".to_string())]
        );
    }
}
