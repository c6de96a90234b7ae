use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::{round_manager::RoundError, session::GameSession};

/// Phases a session moves through, from the lobby to the terminal `ended` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Teams are joining; nothing is being played yet.
    Lobby,
    /// Optional step where the host picks the prompt category.
    CategorySelect,
    /// Teams write their answer to the prompt of their group.
    Answer,
    /// Teams of the active group vote for the funniest answer.
    Vote,
    /// Round results are displayed.
    Results,
    /// Terminal state, the session is immutable from here on.
    Ended,
}

impl Phase {
    /// Every phase reachable from `self` in a single step.
    pub fn allowed_targets(self) -> &'static [Phase] {
        match self {
            Phase::Lobby => &[Phase::CategorySelect, Phase::Answer, Phase::Ended],
            Phase::CategorySelect => &[Phase::Answer, Phase::Ended],
            Phase::Answer => &[Phase::Vote, Phase::Ended],
            Phase::Vote => &[Phase::Results, Phase::Ended],
            Phase::Results => &[Phase::Answer, Phase::Vote, Phase::Ended],
            Phase::Ended => &[],
        }
    }

    /// Whether the transition table contains `self -> to`.
    pub fn can_transition_to(self, to: Phase) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// True once the session can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Ended)
    }

    /// Wire name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Lobby => "lobby",
            Phase::CategorySelect => "category-select",
            Phase::Answer => "answer",
            Phase::Vote => "vote",
            Phase::Results => "results",
            Phase::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts about the session that drive the "what comes next" decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseContext {
    /// Number of non-host teams.
    pub team_count: usize,
    /// At least one answer exists for the current round.
    pub has_answers: bool,
    /// At least one vote exists for the current round.
    pub has_votes: bool,
    /// Every group of the current round has been scored.
    pub current_round_complete: bool,
    /// The current round is complete and it was the last one.
    pub all_rounds_complete: bool,
}

impl PhaseContext {
    /// Derive the context from the current state of a session.
    pub fn from_session(session: &GameSession) -> Self {
        let round_index = session.round_index;
        let current_round_complete = session.current_round().is_some_and(|round| {
            !round.groups.is_empty()
                && round
                    .groups
                    .iter()
                    .all(|group| session.is_group_scored(round_index, group.id))
        });

        Self {
            team_count: session.player_count(),
            has_answers: session
                .answers
                .values()
                .any(|answer| answer.round_index == round_index),
            has_votes: session
                .votes
                .values()
                .any(|vote| vote.round_index == round_index),
            current_round_complete,
            all_rounds_complete: current_round_complete
                && round_index + 1 >= session.settings.total_rounds,
        }
    }
}

/// Error returned when a phase change is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The transition table has no `from -> to` edge.
    #[error("invalid transition: {from} cannot move to {to}")]
    NotAllowed {
        /// Phase the session was in.
        from: Phase,
        /// Requested phase.
        to: Phase,
    },
    /// The edge exists but the session does not satisfy the entry conditions.
    #[error("cannot enter {to}: {reason}")]
    Precondition {
        /// Requested phase.
        to: Phase,
        /// Human readable cause.
        reason: &'static str,
    },
    /// Building the round failed.
    #[error(transparent)]
    Round(#[from] RoundError),
}

/// Minimum number of non-host teams needed to play a round.
pub const MIN_TEAMS: usize = 2;

/// Decide which phase naturally follows `phase`, if any.
pub fn next_phase(phase: Phase, context: &PhaseContext) -> Option<Phase> {
    match phase {
        Phase::Lobby => (context.team_count >= MIN_TEAMS).then_some(Phase::Answer),
        Phase::CategorySelect => (context.team_count >= MIN_TEAMS).then_some(Phase::Answer),
        Phase::Answer => context.has_answers.then_some(Phase::Vote),
        Phase::Vote => context.has_votes.then_some(Phase::Results),
        Phase::Results => Some(if context.all_rounds_complete {
            Phase::Ended
        } else if context.current_round_complete {
            Phase::Answer
        } else {
            Phase::Vote
        }),
        Phase::Ended => None,
    }
}

/// Check the transition table and the entry conditions of `to`.
pub fn validate_transition(session: &GameSession, to: Phase) -> Result<(), TransitionError> {
    let from = session.phase;
    if !from.can_transition_to(to) {
        return Err(TransitionError::NotAllowed { from, to });
    }

    match to {
        Phase::Answer => {
            if session.player_count() < MIN_TEAMS {
                return Err(TransitionError::Precondition {
                    to,
                    reason: "at least two teams are required",
                });
            }
            if session.current_round().is_none() {
                return Err(TransitionError::Precondition {
                    to,
                    reason: "no round exists at the current round index",
                });
            }
        }
        Phase::Vote => {
            let round = session.current_round().ok_or(TransitionError::Precondition {
                to,
                reason: "no round exists at the current round index",
            })?;
            if round.groups.is_empty() {
                return Err(TransitionError::Precondition {
                    to,
                    reason: "the round has no groups",
                });
            }
            if session
                .active_group_index
                .is_some_and(|index| index >= round.groups.len())
            {
                return Err(TransitionError::Precondition {
                    to,
                    reason: "active group index is out of bounds",
                });
            }
        }
        Phase::Results => {
            if session.active_group_index.is_none() {
                return Err(TransitionError::Precondition {
                    to,
                    reason: "no group has been voted on",
                });
            }
        }
        Phase::Lobby | Phase::CategorySelect | Phase::Ended => {}
    }

    Ok(())
}

/// Whether the monitor may move the session forward on its own.
pub fn can_auto_advance(session: &GameSession) -> bool {
    if session.is_paused() {
        return false;
    }
    let context = PhaseContext::from_session(session);
    next_phase(session.phase, &context)
        .is_some_and(|to| validate_transition(session, to).is_ok())
}
