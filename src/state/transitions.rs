//! Entering and leaving phases. Nothing outside this module writes `GameSession::phase`.

use rand::Rng;
use time::OffsetDateTime;

use crate::state::{
    round_manager,
    scoring::{self, ScoreReport},
    session::GameSession,
    state_machine::{MIN_TEAMS, Phase, PhaseContext, TransitionError, next_phase, validate_transition},
};

/// Record of a committed phase (or active group) change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    /// Phase before the change.
    pub from: Phase,
    /// Phase after the change; equal to `from` when only the voting group moved.
    pub to: Phase,
    /// Round after the change.
    pub round_index: u32,
    /// Voting group after the change.
    pub active_group_index: Option<usize>,
}

fn precondition(to: Phase, reason: &'static str) -> TransitionError {
    TransitionError::Precondition { to, reason }
}

fn ensure_edge(session: &GameSession, to: Phase) -> Result<(), TransitionError> {
    let from = session.phase;
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionError::NotAllowed { from, to })
    }
}

/// Set the deadline of the current phase, or park it while paused.
fn arm_deadline(session: &mut GameSession, now: OffsetDateTime) {
    match session.settings.phase_duration(session.phase) {
        Some(duration) if session.is_paused() => {
            session.phase_deadline = None;
            session.paused_remaining_ms = Some(duration.as_millis() as u64);
        }
        Some(duration) => {
            session.phase_deadline = Some(now + duration);
            session.paused_remaining_ms = None;
        }
        None => {
            session.phase_deadline = None;
            session.paused_remaining_ms = None;
        }
    }
}

fn set_phase(session: &mut GameSession, to: Phase, now: OffsetDateTime) -> PhaseChange {
    let from = session.phase;
    session.phase = to;
    arm_deadline(session, now);
    PhaseChange {
        from,
        to,
        round_index: session.round_index,
        active_group_index: session.active_group_index,
    }
}

/// Run `apply` on a copy of the session and keep the result only on success.
fn staged<T>(
    session: &mut GameSession,
    apply: impl FnOnce(&mut GameSession) -> Result<T, TransitionError>,
) -> Result<T, TransitionError> {
    let mut draft = session.clone();
    let value = apply(&mut draft)?;
    *session = draft;
    Ok(value)
}

/// Lobby to category selection.
///
/// The host leaves it by picking a prompt library (or by advancing, which keeps the
/// library chosen at creation).
pub fn enter_category_select(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| category_select_step(draft, now))
}

fn category_select_step(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    ensure_edge(session, Phase::CategorySelect)?;
    if session.player_count() < MIN_TEAMS {
        return Err(precondition(
            Phase::CategorySelect,
            "at least two teams are required",
        ));
    }
    validate_transition(session, Phase::CategorySelect)?;
    Ok(set_phase(session, Phase::CategorySelect, now))
}

/// Start a round: build its groups, draw prompts and open the answer window.
///
/// Coming from `results` this moves to the next round, which requires every group of
/// the current one to be scored and a round left to play.
pub fn enter_answer<R: Rng + ?Sized>(
    session: &mut GameSession,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| answer_step(draft, now, rng))
}

fn answer_step<R: Rng + ?Sized>(
    session: &mut GameSession,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<PhaseChange, TransitionError> {
    ensure_edge(session, Phase::Answer)?;
    if session.player_count() < MIN_TEAMS {
        return Err(precondition(Phase::Answer, "at least two teams are required"));
    }

    if session.phase == Phase::Results {
        let context = PhaseContext::from_session(session);
        if !context.current_round_complete {
            return Err(precondition(
                Phase::Answer,
                "groups of the current round are still voting",
            ));
        }
        if context.all_rounds_complete {
            return Err(precondition(Phase::Answer, "every round has been played"));
        }
        session.round_index += 1;
    }

    let team_ids = session
        .players()
        .map(|team| team.id.clone())
        .collect::<Vec<_>>();
    let (round, deck) = round_manager::create_round(
        &team_ids,
        &session.prompt_deck,
        session.settings.group_size,
        rng,
    )?;
    let round_index = session.round_index as usize;
    session.rounds.truncate(round_index);
    session.rounds.push(round);
    session.prompt_deck = deck;
    session.active_group_index = None;

    validate_transition(session, Phase::Answer)?;
    Ok(set_phase(session, Phase::Answer, now))
}

/// Close the answer window and open voting on the first group.
pub fn enter_vote(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| vote_step(draft, now))
}

fn vote_step(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    ensure_edge(session, Phase::Vote)?;
    if session.phase != Phase::Answer {
        return resume_step(session, now);
    }
    session.active_group_index = Some(0);
    validate_transition(session, Phase::Vote)?;
    Ok(set_phase(session, Phase::Vote, now))
}

/// From `results`, open voting on the next group of the same round.
pub fn resume_voting(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| resume_step(draft, now))
}

fn resume_step(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    ensure_edge(session, Phase::Vote)?;
    let next = session.active_group_index.map_or(0, |index| index + 1);
    let groups = session.current_round().map_or(0, |round| round.groups.len());
    if next >= groups {
        return Err(precondition(Phase::Vote, "no group is left to vote on"));
    }
    session.active_group_index = Some(next);
    validate_transition(session, Phase::Vote)?;
    Ok(set_phase(session, Phase::Vote, now))
}

/// Score the group currently voting.
fn close_active_group(session: &mut GameSession) -> Option<ScoreReport> {
    let round_index = session.round_index;
    let group_id = session.active_group()?.id;
    scoring::apply_group_score(session, round_index, group_id)
}

/// Close the active group's window and score it, then show results.
pub fn enter_results(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| results_step(draft, now))
}

fn results_step(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    validate_transition(session, Phase::Results)?;
    close_active_group(session);
    Ok(set_phase(session, Phase::Results, now))
}

/// Close the active group and hand voting to the next one, or show results after the last.
///
/// Moving to the next group keeps the `vote` phase and re-arms its deadline.
pub fn advance_group(
    session: &mut GameSession,
    now: OffsetDateTime,
) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| group_step(draft, now))
}

fn group_step(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    if session.phase != Phase::Vote {
        return Err(TransitionError::NotAllowed {
            from: session.phase,
            to: Phase::Vote,
        });
    }
    let groups = session.current_round().map_or(0, |round| round.groups.len());
    let Some(current) = session.active_group_index.filter(|index| *index < groups) else {
        return Err(precondition(Phase::Vote, "active group index is out of bounds"));
    };
    let next = current + 1;
    if next >= groups {
        return results_step(session, now);
    }

    close_active_group(session);
    session.active_group_index = Some(next);
    Ok(set_phase(session, Phase::Vote, now))
}

/// Terminal escape hatch, reachable from every live phase.
pub fn end(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    staged(session, |draft| end_step(draft, now))
}

fn end_step(session: &mut GameSession, now: OffsetDateTime) -> Result<PhaseChange, TransitionError> {
    validate_transition(session, Phase::Ended)?;
    let change = set_phase(session, Phase::Ended, now);
    session.paused_at = None;
    session.paused_remaining_ms = None;
    session.ended_at = Some(now);
    Ok(change)
}

/// Move to the phase that naturally follows, regardless of completion.
///
/// Used by the host's manual advance and by deadline expiry.
pub fn force_advance<R: Rng + ?Sized>(
    session: &mut GameSession,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<PhaseChange, TransitionError> {
    match session.phase {
        Phase::Lobby if session.settings.category_select => enter_category_select(session, now),
        Phase::Lobby | Phase::CategorySelect => enter_answer(session, now, rng),
        Phase::Answer => {
            let context = PhaseContext::from_session(session);
            if next_phase(Phase::Answer, &context).is_none() {
                return Err(precondition(Phase::Vote, "no answer was submitted this round"));
            }
            enter_vote(session, now)
        }
        Phase::Vote => enter_results(session, now),
        Phase::Results => {
            let context = PhaseContext::from_session(session);
            match next_phase(Phase::Results, &context) {
                Some(Phase::Ended) => end(session, now),
                Some(Phase::Answer) => enter_answer(session, now, rng),
                _ => resume_voting(session, now),
            }
        }
        Phase::Ended => Err(TransitionError::NotAllowed {
            from: Phase::Ended,
            to: Phase::Ended,
        }),
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::session::tests::lobby_with_players;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    #[test]
    fn lobby_to_answer_builds_round_and_deadline() {
        let mut session = lobby_with_players(5);
        let change = force_advance(&mut session, now(), &mut rng()).unwrap();

        assert_eq!(change.from, Phase::Lobby);
        assert_eq!(change.to, Phase::Answer);
        assert_eq!(session.rounds.len(), 1);
        assert_eq!(session.rounds[0].groups.len(), 2);
        assert_eq!(
            session.phase_deadline,
            Some(now() + time::Duration::milliseconds(60_000))
        );
    }

    #[test]
    fn lobby_goes_through_category_select_when_enabled() {
        let mut session = lobby_with_players(2);
        session.settings.category_select = true;
        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::CategorySelect);
        assert_eq!(session.phase_deadline, None);

        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::Answer);
    }

    #[test]
    fn lonely_team_cannot_start() {
        let mut session = lobby_with_players(1);
        let err = force_advance(&mut session, now(), &mut rng()).unwrap_err();
        assert!(matches!(err, TransitionError::Precondition { to: Phase::Answer, .. }));
        assert_eq!(session.phase, Phase::Lobby);
    }

    #[test]
    fn forced_vote_needs_an_answer() {
        let mut session = lobby_with_players(2);
        force_advance(&mut session, now(), &mut rng()).unwrap();
        assert!(force_advance(&mut session, now(), &mut rng()).is_err());

        session.insert_test_answer("team-0", 0);
        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::Vote);
        assert_eq!(session.active_group_index, Some(0));
    }

    #[test]
    fn full_round_cycle_scores_each_group_once() {
        let mut session = lobby_with_players(4);
        session.settings.group_size = 2;
        force_advance(&mut session, now(), &mut rng()).unwrap();

        let groups = session.rounds[0].groups.clone();
        let mut first_answers = Vec::new();
        for group in &groups {
            let a = session.insert_test_answer(&group.team_ids[0], 0);
            session.insert_test_answer(&group.team_ids[1], 0);
            first_answers.push(a);
        }

        force_advance(&mut session, now(), &mut rng()).unwrap();
        session.insert_test_vote(&groups[0].team_ids[1], first_answers[0]);

        // vote -> results scores group 0
        assert_eq!(force_advance(&mut session, now(), &mut rng()).unwrap().to, Phase::Results);
        assert_eq!(session.teams[&groups[0].team_ids[0]].score, 1100);

        // results -> vote on group 1
        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::Vote);
        assert_eq!(change.active_group_index, Some(1));

        // group 1 via the auto path
        session.insert_test_vote(&groups[1].team_ids[1], first_answers[1]);
        let change = advance_group(&mut session, now()).unwrap();
        assert_eq!(change.to, Phase::Results);
        assert_eq!(session.scored_groups.len(), 2);

        // results -> next round
        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::Answer);
        assert_eq!(session.round_index, 1);
        assert_eq!(session.rounds.len(), 2);
    }

    #[test]
    fn last_round_results_end_the_session() {
        let mut session = lobby_with_players(2);
        session.settings.total_rounds = 1;
        force_advance(&mut session, now(), &mut rng()).unwrap();
        session.insert_test_answer("team-0", 0);
        force_advance(&mut session, now(), &mut rng()).unwrap();
        force_advance(&mut session, now(), &mut rng()).unwrap();

        let change = force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(change.to, Phase::Ended);
        assert_eq!(session.ended_at, Some(now()));
        assert!(force_advance(&mut session, now(), &mut rng()).is_err());
    }

    #[test]
    fn advance_group_moves_within_the_round() {
        let mut session = lobby_with_players(4);
        session.settings.group_size = 2;
        force_advance(&mut session, now(), &mut rng()).unwrap();
        session.insert_test_answer("team-0", 0);
        force_advance(&mut session, now(), &mut rng()).unwrap();

        let later = now() + time::Duration::seconds(5);
        let change = advance_group(&mut session, later).unwrap();
        assert_eq!(change.from, Phase::Vote);
        assert_eq!(change.to, Phase::Vote);
        assert_eq!(session.active_group_index, Some(1));
        assert_eq!(session.scored_groups.len(), 1);
        assert_eq!(
            session.phase_deadline,
            Some(later + time::Duration::milliseconds(30_000))
        );
    }

    #[test]
    fn paused_transition_parks_the_deadline() {
        let mut session = lobby_with_players(2);
        session.paused_at = Some(now());
        force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(session.phase_deadline, None);
        assert_eq!(session.paused_remaining_ms, Some(60_000));
    }

    #[test]
    fn end_is_terminal() {
        let mut session = lobby_with_players(0);
        end(&mut session, now()).unwrap();
        assert_eq!(session.phase, Phase::Ended);
        assert!(matches!(
            end(&mut session, now()),
            Err(TransitionError::NotAllowed { .. })
        ));
    }

    #[test]
    fn failed_transition_leaves_the_session_untouched() {
        let mut session = lobby_with_players(2);
        force_advance(&mut session, now(), &mut rng()).unwrap();
        session.insert_test_answer("team-0", 0);
        force_advance(&mut session, now(), &mut rng()).unwrap();
        force_advance(&mut session, now(), &mut rng()).unwrap();
        assert_eq!(session.phase, Phase::Results);

        // the next round cannot draw a prompt
        session.prompt_deck = round_manager::PromptDeck::default();
        let before = session.clone();
        let err = force_advance(&mut session, now(), &mut rng()).unwrap_err();
        assert!(matches!(err, TransitionError::Round(_)));
        assert_eq!(session, before);
        assert_eq!(session.round_index, 0);
    }

    #[test]
    fn group_out_of_bounds_is_rejected_without_scoring() {
        let mut session = lobby_with_players(4);
        session.settings.group_size = 2;
        force_advance(&mut session, now(), &mut rng()).unwrap();
        session.insert_test_answer("team-0", 0);
        force_advance(&mut session, now(), &mut rng()).unwrap();

        session.active_group_index = Some(7);
        let before = session.clone();
        assert!(advance_group(&mut session, now()).is_err());
        assert_eq!(session, before);
        assert!(session.scored_groups.is_empty());
    }
}
