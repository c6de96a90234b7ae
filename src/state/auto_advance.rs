//! Completion-driven phase changes, re-evaluated after every accepted write.
//!
//! The evaluation runs inside the same transaction as the write that triggered it,
//! so a concurrent transaction that reached the same conclusion fails its commit and,
//! once retried, observes the already advanced phase.

use time::OffsetDateTime;
use tracing::debug;

use crate::state::{
    scoring,
    session::GameSession,
    state_machine::{Phase, can_auto_advance},
    transitions::{self, PhaseChange},
};

/// Every non-host team has answered the current round.
pub fn all_teams_answered(session: &GameSession) -> bool {
    let round_index = session.round_index;
    session
        .players()
        .all(|team| session.answer_for(&team.id, round_index).is_some())
}

/// Every eligible voter of the active group has voted.
pub fn active_group_voted(session: &GameSession) -> bool {
    session
        .active_group()
        .is_some_and(|group| scoring::is_group_vote_complete(session, session.round_index, group))
}

/// Apply every completion-driven transition the session currently qualifies for.
///
/// Groups nobody can vote in are closed immediately, so one call may move through
/// several groups. Returns the changes in the order they happened.
pub fn evaluate(session: &mut GameSession, now: OffsetDateTime) -> Vec<PhaseChange> {
    let mut changes = Vec::new();
    let budget = session
        .current_round()
        .map_or(0, |round| round.groups.len())
        + 2;

    for _ in 0..budget {
        if session.is_paused() {
            break;
        }
        let step = match session.phase {
            Phase::Answer if can_auto_advance(session) && all_teams_answered(session) => {
                transitions::enter_vote(session, now)
            }
            Phase::Vote if active_group_voted(session) => transitions::advance_group(session, now),
            _ => break,
        };
        match step {
            Ok(change) => changes.push(change),
            Err(err) => {
                debug!(session_id = %session.id, phase = %session.phase, error = %err, "auto advance halted");
                break;
            }
        }
    }

    changes
}
