use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::SessionEntity;

pub const SESSION_PREFIX: &str = "session::";
pub const CODE_PREFIX: &str = "code::";

/// Body of a successful PUT.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

/// One session aggregate per document; `_rev` doubles as the commit revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub session: SessionEntity,
}

impl CouchSessionDocument {
    pub fn new(session: SessionEntity, rev: Option<String>) -> Self {
        Self {
            id: session_doc_id(session.id),
            rev,
            session,
        }
    }
}

/// Reservation of a join code; creating it twice fails with 409.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchCodeDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    pub session_id: Uuid,
}

impl CouchCodeDocument {
    pub fn new(code: &str, session_id: Uuid) -> Self {
        Self {
            id: code_doc_id(code),
            rev: None,
            session_id,
        }
    }
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{SESSION_PREFIX}{id}")
}

pub fn code_doc_id(code: &str) -> String {
    format!("{CODE_PREFIX}{}", code.to_uppercase())
}
