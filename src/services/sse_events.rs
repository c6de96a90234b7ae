use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        sessions::SessionSnapshot,
        sse::{PhaseChangedEvent, ServerEvent, SessionUpdatedEvent, SystemStatus},
    },
    state::{SharedState, session::GameSession, transitions::PhaseChange},
};

const EVENT_SESSION_UPDATED: &str = "session.updated";
const EVENT_PHASE_CHANGED: &str = "phase.changed";
const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a snapshot of a session after a committed change.
pub fn broadcast_session_updated(state: &SharedState, session: &GameSession) {
    let payload = SessionUpdatedEvent(SessionSnapshot::from(session));
    send_event(state, EVENT_SESSION_UPDATED, Some(session.id), &payload);
}

/// Broadcast each phase or voting group change, in order.
pub fn broadcast_phase_changes(state: &SharedState, session_id: Uuid, changes: &[PhaseChange]) {
    for change in changes {
        let payload = PhaseChangedEvent::new(session_id, *change);
        send_event(state, EVENT_PHASE_CHANGED, Some(session_id), &payload);
    }
}

/// Broadcast that the backend entered or left degraded mode.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_event(state, EVENT_SYSTEM_STATUS, None, &SystemStatus { degraded });
}

fn send_event(state: &SharedState, event: &str, session_id: Option<Uuid>, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => {
            let message = match session_id {
                Some(id) => message.for_session(id),
                None => message,
            };
            state.sse().broadcast(message)
        }
        Err(err) => warn!(event, error = %err, "failed to serialize SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{AppState, session::tests::lobby_with_players, state_machine::Phase},
    };

    #[tokio::test]
    async fn phase_changes_are_scoped_to_their_session() {
        let state = AppState::new(AppConfig::default());
        let mut receiver = state.sse().subscribe();
        let session = lobby_with_players(2);

        broadcast_phase_changes(
            &state,
            session.id,
            &[PhaseChange {
                from: Phase::Lobby,
                to: Phase::Answer,
                round_index: 0,
                active_group_index: None,
            }],
        );
        broadcast_session_updated(&state, &session);

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event.as_deref(), Some(EVENT_PHASE_CHANGED));
        assert_eq!(first.session_id, Some(session.id));
        assert!(first.data.contains("\"to\":\"answer\""));

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.event.as_deref(), Some(EVENT_SESSION_UPDATED));
        assert!(second.data.contains("\"code\":\"ABCDEF\""));
    }
}
