use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::SessionEntity;

/// Stored shape of a session: the aggregate plus the fields queries and indexes need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    /// Hyphenated session id.
    #[serde(rename = "_id")]
    pub id: String,
    /// Upper-case join code, unique across the collection.
    pub code: String,
    /// Incremented by every successful commit.
    pub revision: i64,
    pub session: SessionEntity,
}

impl MongoSessionDocument {
    pub fn new(session: SessionEntity, revision: i64) -> Self {
        Self {
            id: session.id.to_string(),
            code: session.code.to_uppercase(),
            revision,
            session,
        }
    }
}

/// Lookup projection for join codes.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoCodeProjection {
    #[serde(rename = "_id")]
    pub id: String,
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}
