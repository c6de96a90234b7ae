//! Command bodies executed inside a session transaction.
//!
//! Each function validates against the session it is handed, mutates it and returns
//! the phase changes it caused. They are free of I/O so the gateway can re-run them
//! against fresh state after a conflict.

use rand::Rng;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::ServiceError,
    services::moderation::Moderated,
    state::{
        auto_advance,
        round_manager::{self, PromptDeck},
        session::{Answer, GameSession, NewSession, SessionSettings, Team, Vote},
        state_machine::{MIN_TEAMS, Phase},
        transitions::{self, PhaseChange},
    },
};

/// Trim `name` and check it against the configured length.
pub fn normalize_team_name(name: &str, max_chars: usize) -> Result<String, ServiceError> {
    let trimmed = name.trim();
    let length = trimmed.chars().count();
    if length == 0 || length > max_chars {
        return Err(ServiceError::InvalidInput(format!(
            "team name must be between 1 and {max_chars} characters"
        )));
    }
    Ok(trimmed.to_owned())
}

/// Parameters of a new session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    /// Identity of the host.
    pub host_id: String,
    /// Normalized host team name.
    pub team_name: String,
    /// Optional venue label.
    pub venue_name: Option<String>,
    /// Library the deck is built from.
    pub prompt_library_id: Option<String>,
    /// Session tunables.
    pub settings: SessionSettings,
}

/// Build a lobby session with a freshly shuffled deck drawn from `prompts`.
pub fn create_session<R: Rng + ?Sized>(
    params: CreateSession,
    code: String,
    prompts: &[String],
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<GameSession, ServiceError> {
    if prompts.is_empty() {
        return Err(ServiceError::InvalidInput(
            "the prompt library has no prompts".into(),
        ));
    }

    Ok(GameSession::new(
        NewSession {
            code,
            host_id: params.host_id,
            host_name: params.team_name,
            venue_name: params.venue_name,
            prompt_library_id: params.prompt_library_id,
            settings: params.settings,
            prompt_deck: PromptDeck::new(prompts.to_vec(), rng),
        },
        now,
    ))
}

fn ensure_host(session: &GameSession, host_id: &str, action: &str) -> Result<(), ServiceError> {
    if session.host_id == host_id {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(format!(
            "only the host can {action}"
        )))
    }
}

fn ensure_live(session: &GameSession) -> Result<(), ServiceError> {
    if session.phase.is_terminal() {
        Err(ServiceError::FailedPrecondition("session has ended".into()))
    } else {
        Ok(())
    }
}

fn ensure_running(session: &GameSession) -> Result<(), ServiceError> {
    ensure_live(session)?;
    if session.is_paused() {
        Err(ServiceError::FailedPrecondition("session is paused".into()))
    } else {
        Ok(())
    }
}

fn ensure_player(session: &GameSession, team_id: &str) -> Result<(), ServiceError> {
    match session.teams.get(team_id) {
        None => Err(ServiceError::NotFound(format!(
            "team {team_id} is not part of this session"
        ))),
        Some(team) if team.is_host => Err(ServiceError::PermissionDenied(
            "the host does not play".into(),
        )),
        Some(_) => Ok(()),
    }
}

fn ensure_before_deadline(session: &GameSession, now: OffsetDateTime) -> Result<(), ServiceError> {
    if session.deadline_passed(now) {
        Err(ServiceError::DeadlineExceeded(format!(
            "the {} phase is over",
            session.phase
        )))
    } else {
        Ok(())
    }
}

/// Place `team_id` in the current round if it has no group yet.
fn ensure_placed<R: Rng + ?Sized>(
    session: &mut GameSession,
    team_id: &str,
    rng: &mut R,
) -> Result<Uuid, ServiceError> {
    let round_index = session.round_index as usize;
    let round = session
        .rounds
        .get(round_index)
        .ok_or_else(|| ServiceError::Internal(format!("round {round_index} was never created")))?;

    let placement = round_manager::add_team_to_round(
        round,
        team_id,
        &session.prompt_deck,
        session.settings.group_size,
        rng,
    )?;
    let group_id = placement.round.groups[placement.group_index].id;
    if placement.created {
        debug!(session_id = %session.id, %team_id, %group_id, "opened a group for a late team");
    }
    session.rounds[round_index] = placement.round;
    session.prompt_deck = placement.deck;
    Ok(group_id)
}

/// Result of a join.
#[derive(Debug, Clone)]
pub struct Joined {
    /// The team as stored.
    pub team: Team,
    /// `false` when the identity had already joined.
    pub created: bool,
}

/// Add a team, or return the existing one for a repeated join.
pub fn join<R: Rng + ?Sized>(
    session: &mut GameSession,
    team_id: &str,
    team_name: &str,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<Joined, ServiceError> {
    if session.banned.iter().any(|banned| banned == team_id) {
        return Err(ServiceError::PermissionDenied(
            "this team was banned from the session".into(),
        ));
    }
    if let Some(team) = session.teams.get(team_id) {
        return Ok(Joined {
            team: team.clone(),
            created: false,
        });
    }
    ensure_live(session)?;

    let lowered = team_name.to_lowercase();
    if session
        .teams
        .values()
        .any(|team| team.name.to_lowercase() == lowered)
    {
        return Err(ServiceError::AlreadyExists(format!(
            "team name {team_name} is taken"
        )));
    }
    if session.player_count() >= session.settings.max_teams {
        return Err(ServiceError::ResourceExhausted("the room is full".into()));
    }

    let team = Team {
        id: team_id.to_owned(),
        name: team_name.to_owned(),
        is_host: false,
        score: 0,
        joined_at: now,
        last_active_at: Some(now),
    };
    session.teams.insert(team.id.clone(), team.clone());

    if session.phase == Phase::Answer {
        ensure_placed(session, team_id, rng)?;
    }

    Ok(Joined {
        team,
        created: true,
    })
}

/// Leave the lobby.
pub fn start<R: Rng + ?Sized>(
    session: &mut GameSession,
    host_id: &str,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_host(session, host_id, "start the session")?;
    if session.phase != Phase::Lobby {
        return Err(ServiceError::FailedPrecondition(
            "session already started".into(),
        ));
    }
    if session.player_count() < MIN_TEAMS {
        return Err(ServiceError::FailedPrecondition(format!(
            "at least {MIN_TEAMS} teams are needed to start"
        )));
    }
    ensure_running(session)?;

    let change = transitions::force_advance(session, now, rng)?;
    Ok(with_auto_advance(session, change, now))
}

/// Host-driven advance to the naturally following phase.
pub fn advance<R: Rng + ?Sized>(
    session: &mut GameSession,
    host_id: &str,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_host(session, host_id, "advance the session")?;
    ensure_running(session)?;
    let change = transitions::force_advance(session, now, rng)?;
    Ok(with_auto_advance(session, change, now))
}

/// Advance only once the phase deadline has passed; a no-op otherwise.
pub fn advance_if_expired<R: Rng + ?Sized>(
    session: &mut GameSession,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<Vec<PhaseChange>, ServiceError> {
    if session.phase.is_terminal() || session.is_paused() || !session.deadline_passed(now) {
        return Ok(Vec::new());
    }
    let change = transitions::force_advance(session, now, rng)?;
    Ok(with_auto_advance(session, change, now))
}

/// Pick the prompt library during category selection and open the first round with it.
pub fn select_category<R: Rng + ?Sized>(
    session: &mut GameSession,
    host_id: &str,
    library_id: &str,
    prompts: &[String],
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_host(session, host_id, "pick the category")?;
    ensure_running(session)?;
    if session.phase != Phase::CategorySelect {
        return Err(ServiceError::FailedPrecondition(
            "no category is being selected".into(),
        ));
    }
    if prompts.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "prompt library {library_id} is empty"
        )));
    }

    session.prompt_library_id = Some(library_id.to_owned());
    session.prompt_deck = PromptDeck::new(prompts.to_vec(), rng);
    let change = transitions::enter_answer(session, now, rng)?;
    Ok(with_auto_advance(session, change, now))
}

fn with_auto_advance(
    session: &mut GameSession,
    change: PhaseChange,
    now: OffsetDateTime,
) -> Vec<PhaseChange> {
    let mut changes = vec![change];
    changes.extend(auto_advance::evaluate(session, now));
    changes
}

/// Outcome of an accepted answer.
#[derive(Debug, Clone)]
pub struct AnswerReceipt {
    /// Stable id of the answer; kept when the team edits it.
    pub answer_id: Uuid,
    /// Phase changes the answer triggered.
    pub changes: Vec<PhaseChange>,
}

/// Store or replace the caller's answer for the current round.
pub fn submit_answer<R: Rng + ?Sized>(
    session: &mut GameSession,
    team_id: &str,
    text: &Moderated,
    now: OffsetDateTime,
    rng: &mut R,
) -> Result<AnswerReceipt, ServiceError> {
    ensure_running(session)?;
    if session.phase != Phase::Answer {
        return Err(ServiceError::FailedPrecondition(
            "answers are only accepted during the answer phase".into(),
        ));
    }
    ensure_before_deadline(session, now)?;
    ensure_player(session, team_id)?;

    let round_index = session.round_index;
    let group_id = ensure_placed(session, team_id, rng)?;
    let key = (team_id.to_owned(), round_index);

    let answer_id = match session.answers.get_mut(&key) {
        Some(existing) => {
            existing.text = text.text.clone();
            existing.masked = text.masked;
            existing.group_id = group_id;
            existing.id
        }
        None => {
            let answer = Answer {
                id: Uuid::new_v4(),
                team_id: team_id.to_owned(),
                round_index,
                group_id,
                text: text.text.clone(),
                created_at: now,
                masked: text.masked,
            };
            let id = answer.id;
            session.answers.insert(key, answer);
            id
        }
    };
    session.touch_team(team_id, now);

    Ok(AnswerReceipt {
        answer_id,
        changes: auto_advance::evaluate(session, now),
    })
}

/// Store or replace the caller's vote in the active group.
pub fn submit_vote(
    session: &mut GameSession,
    voter_id: &str,
    answer_id: Uuid,
    now: OffsetDateTime,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_running(session)?;
    if session.phase != Phase::Vote {
        return Err(ServiceError::FailedPrecondition(
            "votes are only accepted during the vote phase".into(),
        ));
    }
    ensure_before_deadline(session, now)?;
    ensure_player(session, voter_id)?;

    let round_index = session.round_index;
    let answer = session
        .answer_by_id(answer_id)
        .ok_or_else(|| ServiceError::NotFound(format!("answer {answer_id} not found")))?;
    let group = session.active_group().ok_or_else(|| {
        ServiceError::Internal("vote phase without an active group".into())
    })?;

    if answer.round_index != round_index || answer.group_id != group.id {
        return Err(ServiceError::FailedPrecondition(
            "answer is not in the group currently voting".into(),
        ));
    }
    if !group.contains(voter_id) {
        return Err(ServiceError::FailedPrecondition(
            "team is not in the group currently voting".into(),
        ));
    }
    if answer.team_id == voter_id {
        return Err(ServiceError::FailedPrecondition(
            "teams cannot vote for their own answer".into(),
        ));
    }

    let group_id = group.id;
    session.votes.insert(
        (voter_id.to_owned(), round_index, group_id),
        Vote {
            voter_id: voter_id.to_owned(),
            round_index,
            group_id,
            answer_id,
            created_at: now,
        },
    );
    session.touch_team(voter_id, now);

    Ok(auto_advance::evaluate(session, now))
}

/// Freeze or resume the phase deadline.
pub fn set_paused(
    session: &mut GameSession,
    host_id: &str,
    pause: bool,
    now: OffsetDateTime,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_host(session, host_id, "pause the session")?;
    ensure_live(session)?;

    match (pause, session.paused_at) {
        (true, None) => {
            session.paused_remaining_ms = session
                .phase_deadline
                .map(|deadline| (deadline - now).whole_milliseconds().max(0) as u64);
            session.phase_deadline = None;
            session.paused_at = Some(now);
            Ok(Vec::new())
        }
        (false, Some(paused_at)) => {
            let paused_for = (now - paused_at).whole_milliseconds().max(0) as u64;
            session.total_paused_ms += paused_for;
            session.phase_deadline = session
                .paused_remaining_ms
                .take()
                .map(|remaining| now + time::Duration::milliseconds(remaining as i64));
            session.paused_at = None;
            Ok(auto_advance::evaluate(session, now))
        }
        _ => Ok(Vec::new()),
    }
}

/// Remove a team, optionally banning its identity.
pub fn remove_team(
    session: &mut GameSession,
    host_id: &str,
    team_id: &str,
    ban: bool,
    now: OffsetDateTime,
) -> Result<Vec<PhaseChange>, ServiceError> {
    ensure_host(session, host_id, "remove teams")?;
    if team_id == session.host_id {
        return Err(ServiceError::FailedPrecondition(
            "the host cannot be removed".into(),
        ));
    }
    ensure_live(session)?;

    if ban && !session.banned.iter().any(|banned| banned == team_id) {
        session.banned.push(team_id.to_owned());
    }
    if session.teams.shift_remove(team_id).is_none() {
        return if ban {
            Ok(Vec::new())
        } else {
            Err(ServiceError::NotFound(format!(
                "team {team_id} is not part of this session"
            )))
        };
    }

    let round_index = session.round_index;
    let open_groups = session
        .current_round()
        .map(|round| {
            round
                .groups
                .iter()
                .map(|group| group.id)
                .filter(|group_id| !session.is_group_scored(round_index, *group_id))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if let Some(round) = session.rounds.get_mut(round_index as usize) {
        for group in round
            .groups
            .iter_mut()
            .filter(|group| open_groups.contains(&group.id))
        {
            group.team_ids.retain(|id| id != team_id);
        }
    }

    let dropped = session
        .answers
        .get(&(team_id.to_owned(), round_index))
        .filter(|answer| open_groups.contains(&answer.group_id))
        .map(|answer| answer.id);
    if dropped.is_some() {
        session.answers.shift_remove(&(team_id.to_owned(), round_index));
    }
    session.votes.retain(|(voter, round, group_id), vote| {
        let open = *round == round_index && open_groups.contains(group_id);
        !(open && (voter == team_id || Some(vote.answer_id) == dropped))
    });

    Ok(auto_advance::evaluate(session, now))
}

/// Terminate the session.
pub fn end(
    session: &mut GameSession,
    host_id: &str,
    now: OffsetDateTime,
) -> Result<PhaseChange, ServiceError> {
    ensure_host(session, host_id, "end the session")?;
    Ok(transitions::end(session, now)?)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::state::{
        scoring::WINNER_BONUS,
        session::tests::{HOST, lobby_with_players, team_id},
    };

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    fn at(ms: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + time::Duration::milliseconds(ms)
    }

    fn text(value: &str) -> Moderated {
        Moderated {
            text: value.into(),
            masked: false,
            truncated: false,
        }
    }

    fn started(players: usize, group_size: usize) -> GameSession {
        let mut session = lobby_with_players(players);
        session.settings.group_size = group_size;
        start(&mut session, HOST, at(0), &mut rng()).unwrap();
        session
    }

    #[test]
    fn team_names_are_trimmed_and_bounded() {
        assert_eq!(normalize_team_name("  Quizzly Bears ", 24).unwrap(), "Quizzly Bears");
        assert!(matches!(normalize_team_name("   ", 24), Err(ServiceError::InvalidInput(_))));
        assert!(normalize_team_name("abcdef", 5).is_err());
    }

    #[test]
    fn create_rejects_an_empty_prompt_pool() {
        let params = CreateSession {
            host_id: HOST.into(),
            team_name: "Host".into(),
            venue_name: None,
            prompt_library_id: None,
            settings: lobby_with_players(0).settings,
        };
        let err = create_session(params.clone(), "ABCDEF".into(), &[], at(0), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let prompts = vec!["a".to_string(), "b".to_string()];
        let session = create_session(params, "ABCDEF".into(), &prompts, at(0), &mut rng()).unwrap();
        assert_eq!(session.phase, Phase::Lobby);
        assert!(session.teams[HOST].is_host);
        assert_eq!(session.prompt_deck.remaining(), 2);
    }

    #[test]
    fn join_rules() {
        let mut session = lobby_with_players(1);
        let joined = join(&mut session, "t-new", "Newcomers", at(5), &mut rng()).unwrap();
        assert!(joined.created);

        let again = join(&mut session, "t-new", "Other name", at(6), &mut rng()).unwrap();
        assert!(!again.created);
        assert_eq!(again.team.name, "Newcomers");

        let err = join(&mut session, "t-dup", "newcomers", at(7), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));

        session.settings.max_teams = 2;
        let err = join(&mut session, "t-full", "Late", at(8), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::ResourceExhausted(_)));

        session.banned.push("t-bad".into());
        let err = join(&mut session, "t-bad", "Trouble", at(9), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[test]
    fn late_join_during_answer_opens_a_group() {
        let mut session = started(4, 4);
        assert_eq!(session.phase, Phase::Answer);
        let used_prompt = session.current_round().unwrap().groups[0].prompt.clone();

        join(&mut session, "late", "Latecomers", at(10), &mut rng()).unwrap();

        let round = session.current_round().unwrap();
        assert_eq!(round.groups.len(), 2);
        assert!(round.groups[1].contains("late"));
        assert_ne!(round.groups[1].prompt, used_prompt);
    }

    #[test]
    fn start_needs_host_lobby_and_players() {
        let mut session = lobby_with_players(1);
        assert!(matches!(
            start(&mut session, "team-1", at(0), &mut rng()),
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            start(&mut session, HOST, at(0), &mut rng()),
            Err(ServiceError::FailedPrecondition(_))
        ));

        let mut session = started(2, 4);
        assert!(matches!(
            start(&mut session, HOST, at(1), &mut rng()),
            Err(ServiceError::FailedPrecondition(_))
        ));
    }

    #[test]
    fn answers_are_upserted_and_auto_advance_once_everyone_answered() {
        let mut session = started(2, 4);

        let first = submit_answer(&mut session, &team_id(0), &text("one"), at(1), &mut rng()).unwrap();
        let edited = submit_answer(&mut session, &team_id(0), &text("uno"), at(2), &mut rng()).unwrap();
        assert_eq!(first.answer_id, edited.answer_id);
        assert!(edited.changes.is_empty());
        assert_eq!(session.answers.len(), 1);

        let last = submit_answer(&mut session, &team_id(1), &text("two"), at(3), &mut rng()).unwrap();
        assert_eq!(last.changes.len(), 1);
        assert_eq!(session.phase, Phase::Vote);

        let err = submit_answer(&mut session, &team_id(1), &text("late"), at(4), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::FailedPrecondition(_)));
    }

    #[test]
    fn answer_rejections() {
        let mut session = started(2, 4);
        assert!(matches!(
            submit_answer(&mut session, HOST, &text("x"), at(1), &mut rng()),
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            submit_answer(&mut session, "stranger", &text("x"), at(1), &mut rng()),
            Err(ServiceError::NotFound(_))
        ));
        let too_late = at(session.settings.answer_duration_ms as i64 + 1);
        assert!(matches!(
            submit_answer(&mut session, &team_id(0), &text("x"), too_late, &mut rng()),
            Err(ServiceError::DeadlineExceeded(_))
        ));
    }

    #[test]
    fn vote_rules_and_scoring_on_close() {
        let mut session = started(3, 4);
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                submit_answer(&mut session, &team_id(i), &text("a"), at(1), &mut rng())
                    .unwrap()
                    .answer_id,
            );
        }
        assert_eq!(session.phase, Phase::Vote);

        assert!(matches!(
            submit_vote(&mut session, &team_id(0), ids[0], at(2)),
            Err(ServiceError::FailedPrecondition(_))
        ));
        assert!(matches!(
            submit_vote(&mut session, &team_id(0), Uuid::new_v4(), at(2)),
            Err(ServiceError::NotFound(_))
        ));

        submit_vote(&mut session, &team_id(1), ids[0], at(2)).unwrap();
        submit_vote(&mut session, &team_id(1), ids[2], at(3)).unwrap();
        assert_eq!(session.votes.len(), 1);

        submit_vote(&mut session, &team_id(2), ids[0], at(4)).unwrap();
        let changes = submit_vote(&mut session, &team_id(0), ids[1], at(5)).unwrap();
        assert_eq!(changes.last().unwrap().to, Phase::Results);

        assert_eq!(session.teams[&team_id(0)].score, 100 + WINNER_BONUS);
        assert_eq!(session.teams[&team_id(1)].score, 100 + WINNER_BONUS);
        assert_eq!(session.teams[&team_id(2)].score, 100 + WINNER_BONUS);
    }

    #[test]
    fn pause_freezes_and_restores_the_deadline() {
        let mut session = started(2, 4);
        let deadline = session.phase_deadline.unwrap();

        set_paused(&mut session, HOST, true, at(10_000)).unwrap();
        assert!(session.is_paused());
        assert_eq!(session.phase_deadline, None);
        assert_eq!(session.paused_remaining_ms, Some(50_000));
        set_paused(&mut session, HOST, true, at(11_000)).unwrap();
        assert_eq!(session.paused_at, Some(at(10_000)));

        assert!(matches!(
            submit_answer(&mut session, &team_id(0), &text("x"), at(12_000), &mut rng()),
            Err(ServiceError::FailedPrecondition(_))
        ));

        set_paused(&mut session, HOST, false, at(40_000)).unwrap();
        assert_eq!(session.total_paused_ms, 30_000);
        assert_eq!(session.phase_deadline, Some(deadline + time::Duration::seconds(30)));
        assert_eq!(session.paused_remaining_ms, None);
    }

    #[test]
    fn expiry_only_advances_after_the_deadline() {
        let mut session = started(2, 4);
        submit_answer(&mut session, &team_id(0), &text("x"), at(1), &mut rng()).unwrap();

        assert!(advance_if_expired(&mut session, at(59_000), &mut rng()).unwrap().is_empty());
        assert_eq!(session.phase, Phase::Answer);

        let changes = advance_if_expired(&mut session, at(60_001), &mut rng()).unwrap();
        assert_eq!(changes[0].to, Phase::Vote);
    }

    #[test]
    fn kicking_drops_open_answers_and_votes() {
        let mut session = started(3, 4);
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(
                submit_answer(&mut session, &team_id(i), &text("a"), at(1), &mut rng())
                    .unwrap()
                    .answer_id,
            );
        }
        submit_vote(&mut session, &team_id(0), ids[1], at(2)).unwrap();
        submit_vote(&mut session, &team_id(2), ids[1], at(2)).unwrap();

        assert!(matches!(
            remove_team(&mut session, HOST, HOST, false, at(3)),
            Err(ServiceError::FailedPrecondition(_))
        ));
        let changes = remove_team(&mut session, HOST, &team_id(1), true, at(3)).unwrap();

        assert!(!session.teams.contains_key(&team_id(1)));
        assert!(session.banned.contains(&team_id(1)));
        assert!(session.answer_by_id(ids[1]).is_none());
        assert!(session.votes.is_empty());
        assert!(changes.is_empty());
        assert!(!session.current_round().unwrap().groups[0].contains(&team_id(1)));
        assert!(matches!(
            remove_team(&mut session, HOST, "nobody", false, at(4)),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn ending_is_host_only_and_terminal() {
        let mut session = started(2, 4);
        assert!(matches!(
            end(&mut session, &team_id(0), at(1)),
            Err(ServiceError::PermissionDenied(_))
        ));
        end(&mut session, HOST, at(1)).unwrap();
        assert_eq!(session.phase, Phase::Ended);
        assert!(matches!(
            set_paused(&mut session, HOST, true, at(2)),
            Err(ServiceError::FailedPrecondition(_))
        ));
        assert!(end(&mut session, HOST, at(2)).is_err());
    }

    #[test]
    fn category_pick_rebuilds_the_deck_and_opens_the_round() {
        let mut session = lobby_with_players(2);
        session.settings.category_select = true;
        start(&mut session, HOST, at(0), &mut rng()).unwrap();
        assert_eq!(session.phase, Phase::CategorySelect);

        let office = vec!["Why is the stapler crying".to_string()];
        let err = select_category(&mut session, &team_id(0), "office", &office, at(1), &mut rng())
            .unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
        let err = select_category(&mut session, HOST, "empty", &[], at(1), &mut rng()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let changes =
            select_category(&mut session, HOST, "office", &office, at(1), &mut rng()).unwrap();
        assert_eq!(changes[0].to, Phase::Answer);
        assert_eq!(session.prompt_library_id.as_deref(), Some("office"));
        assert_eq!(session.prompt_deck.pool, office);
        assert_eq!(session.current_round().unwrap().groups[0].prompt, office[0]);

        let err = select_category(&mut session, HOST, "office", &office, at(2), &mut rng())
            .unwrap_err();
        assert!(matches!(err, ServiceError::FailedPrecondition(_)));
    }
}
