use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    dto::sessions::SessionSnapshot,
    state::{state_machine::Phase, transitions::PhaseChange},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across the SSE channel.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
    /// Session the event belongs to; `None` for stream-wide messages.
    pub session_id: Option<Uuid>,
}

impl ServerEvent {
    /// Raw event without a session scope.
    pub fn new(event: Option<String>, data: String) -> Self {
        Self {
            event,
            data,
            session_id: None,
        }
    }

    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self::new(event.into(), serde_json::to_string(payload)?))
    }

    /// Scope the event to `session_id`.
    pub fn for_session(mut self, session_id: Uuid) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Whether a subscriber filtering on `filter` should receive this event.
    pub fn matches(&self, filter: Option<Uuid>) -> bool {
        match (filter, self.session_id) {
            (None, _) | (_, None) => true,
            (Some(wanted), Some(id)) => wanted == id,
        }
    }
}

/// Query parameters of the session stream.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionStreamQuery {
    /// Only forward events of this session.
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Session the stream is filtered on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast after every committed mutation of a session.
pub struct SessionUpdatedEvent(pub SessionSnapshot);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast for every phase or voting group change.
pub struct PhaseChangedEvent {
    pub session_id: Uuid,
    pub from: Phase,
    pub to: Phase,
    pub round_index: u32,
    pub active_group_index: Option<usize>,
}

impl PhaseChangedEvent {
    /// Event for `change` in session `session_id`.
    pub fn new(session_id: Uuid, change: PhaseChange) -> Self {
        Self {
            session_id,
            from: change.from,
            to: change.to,
            round_index: change.round_index,
            active_group_index: change.active_group_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_filter() {
        let id = Uuid::new_v4();
        let scoped = ServerEvent::new(None, "x".into()).for_session(id);
        let global = ServerEvent::new(None, "y".into());

        assert!(scoped.matches(None));
        assert!(scoped.matches(Some(id)));
        assert!(!scoped.matches(Some(Uuid::new_v4())));
        assert!(global.matches(Some(id)));
    }
}
