//! Host and team commands: validation, the transaction, then change notifications.

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::sessions::{
        AnswerResponse, CreateSessionRequest, CreateSessionResponse, JoinSessionRequest,
        JoinSessionResponse, SessionSnapshot, TeamSummary,
    },
    error::ServiceError,
    services::{gateway, moderation, sse_events},
    state::{
        SharedState,
        commands::{self, CreateSession},
        session::GameSession,
        transitions::PhaseChange,
    },
};

fn log_changes(session_id: Uuid, changes: &[PhaseChange]) {
    for change in changes {
        info!(
            %session_id,
            from = %change.from,
            to = %change.to,
            round_index = change.round_index,
            active_group_index = ?change.active_group_index,
            "phase changed"
        );
    }
}

fn publish(state: &SharedState, session: &GameSession, changes: &[PhaseChange], changed: bool) {
    log_changes(session.id, changes);
    if changed {
        sse_events::broadcast_phase_changes(state, session.id, changes);
        sse_events::broadcast_session_updated(state, session);
    }
}

fn log_rejection(session_id: Uuid, team_id: &str, action: &'static str, err: &ServiceError) {
    debug!(%session_id, %team_id, action, error = %err, "submission rejected");
}

/// Run a phase-affecting command and publish its outcome.
async fn run_command<F>(
    state: &SharedState,
    session_id: Uuid,
    body: F,
) -> Result<SessionSnapshot, ServiceError>
where
    F: FnMut(&mut GameSession, OffsetDateTime) -> Result<Vec<PhaseChange>, ServiceError>,
{
    let committed = gateway::run_in_transaction(state, session_id, body).await?;
    publish(state, &committed.session, &committed.value, committed.changed);
    Ok(SessionSnapshot::from(&committed.session))
}

/// Reject non-hosts before opening a transaction; the command body checks again.
async fn precheck_host(
    state: &SharedState,
    session_id: Uuid,
    host_id: &str,
) -> Result<(), ServiceError> {
    let session = gateway::read_session(state, session_id).await?;
    if session.host_id == host_id {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied(
            "only the host can do this".into(),
        ))
    }
}

/// Open a new session owned by the caller.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<CreateSessionResponse, ServiceError> {
    let config = state.config();
    let team_name = commands::normalize_team_name(&request.team_name, config.team_name_max_chars())?;
    let library = request
        .prompt_library_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if let Some(id) = library.filter(|id| !config.has_library(id)) {
        debug!(library = id, "unknown prompt library; using default prompts");
    }
    let prompts = config.prompts_for(library);

    let params = CreateSession {
        host_id: request.host_id.clone(),
        team_name,
        venue_name: request
            .venue_name
            .map(|venue| venue.trim().to_owned())
            .filter(|venue| !venue.is_empty()),
        prompt_library_id: library.map(str::to_owned),
        settings: config.session_defaults().clone(),
    };

    let session = gateway::insert_session(state, |code| {
        commands::create_session(
            params.clone(),
            code,
            prompts,
            OffsetDateTime::now_utc(),
            &mut rand::rng(),
        )
    })
    .await?;

    let team = session
        .teams
        .get(&session.host_id)
        .map(TeamSummary::from)
        .ok_or_else(|| ServiceError::Internal("new session has no host team".into()))?;
    info!(session_id = %session.id, code = %session.code, host_id = %session.host_id, "session created");
    sse_events::broadcast_session_updated(state, &session);

    Ok(CreateSessionResponse {
        session_id: session.id,
        code: session.code.clone(),
        session: SessionSnapshot::from(&session),
        team,
    })
}

/// Join a session by code, or return the caller's existing team.
pub async fn join_session(
    state: &SharedState,
    request: JoinSessionRequest,
) -> Result<JoinSessionResponse, ServiceError> {
    let team_name =
        commands::normalize_team_name(&request.team_name, state.config().team_name_max_chars())?;
    let session_id = gateway::find_session_by_code(state, &request.code).await?;
    let team_id = request.team_id;

    let committed = gateway::run_in_transaction(state, session_id, |session, now| {
        commands::join(session, &team_id, &team_name, now, &mut rand::rng())
    })
    .await?;

    if committed.value.created {
        info!(%session_id, %team_id, team_name = %committed.value.team.name, "team joined");
    }
    publish(state, &committed.session, &[], committed.changed);

    Ok(JoinSessionResponse {
        session_id,
        session: SessionSnapshot::from(&committed.session),
        team: TeamSummary::from(&committed.value.team),
    })
}

/// Leave the lobby.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
) -> Result<SessionSnapshot, ServiceError> {
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::start(session, &host_id, now, &mut rand::rng())
    })
    .await
}

/// Force the next phase.
pub async fn advance_phase(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
) -> Result<SessionSnapshot, ServiceError> {
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::advance(session, &host_id, now, &mut rand::rng())
    })
    .await
}

/// Advance when the phase deadline has passed; otherwise return the session unchanged.
pub async fn advance_if_expired(
    state: &SharedState,
    session_id: Uuid,
) -> Result<SessionSnapshot, ServiceError> {
    run_command(state, session_id, |session, now| {
        commands::advance_if_expired(session, now, &mut rand::rng())
    })
    .await
}

/// Pick the prompt library of the session while it is in category selection.
pub async fn select_category(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
    library_id: String,
) -> Result<SessionSnapshot, ServiceError> {
    let config = state.config();
    if !config.has_library(&library_id) {
        return Err(ServiceError::NotFound(format!(
            "prompt library {library_id} does not exist"
        )));
    }
    let prompts = config.prompts_for(Some(&library_id)).to_vec();
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::select_category(session, &host_id, &library_id, &prompts, now, &mut rand::rng())
    })
    .await
}

/// Accept (or replace) a team's answer for the current round.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    team_id: String,
    text: String,
) -> Result<AnswerResponse, ServiceError> {
    let config = state.config();
    let moderated = moderation::moderate(&text, config.answer_max_chars(), config.blocked_words())
        .inspect_err(|err| log_rejection(session_id, &team_id, "answer", err))?;

    let committed = gateway::run_in_transaction(state, session_id, |session, now| {
        commands::submit_answer(session, &team_id, &moderated, now, &mut rand::rng())
    })
    .await
    .inspect_err(|err| log_rejection(session_id, &team_id, "answer", err))?;

    publish(
        state,
        &committed.session,
        &committed.value.changes,
        committed.changed,
    );
    Ok(AnswerResponse {
        success: true,
        answer_id: committed.value.answer_id,
        masked: moderated.masked,
        truncated: moderated.truncated,
    })
}

/// Accept (or replace) a team's vote in the active group.
pub async fn submit_vote(
    state: &SharedState,
    session_id: Uuid,
    team_id: String,
    answer_id: Uuid,
) -> Result<(), ServiceError> {
    let committed = gateway::run_in_transaction(state, session_id, |session, now| {
        commands::submit_vote(session, &team_id, answer_id, now)
    })
    .await
    .inspect_err(|err| log_rejection(session_id, &team_id, "vote", err))?;

    publish(state, &committed.session, &committed.value, committed.changed);
    Ok(())
}

/// Freeze or resume the session clock.
pub async fn pause_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
    pause: bool,
) -> Result<SessionSnapshot, ServiceError> {
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::set_paused(session, &host_id, pause, now)
    })
    .await
}

/// Remove a team; `ban` also blocks it from joining again.
pub async fn remove_team(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
    team_id: String,
    ban: bool,
) -> Result<(), ServiceError> {
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::remove_team(session, &host_id, &team_id, ban, now)
    })
    .await?;
    info!(%session_id, %team_id, ban, "team removed");
    Ok(())
}

/// Terminate the session.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    host_id: String,
) -> Result<SessionSnapshot, ServiceError> {
    precheck_host(state, session_id, &host_id).await?;
    run_command(state, session_id, |session, now| {
        commands::end(session, &host_id, now).map(|change| vec![change])
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Arc};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemorySessionStore,
        services::{gateway::RetryPolicy, public_service},
        state::{AppState, session::SessionSettings, state_machine::Phase},
    };

    fn settings(group_size: usize) -> SessionSettings {
        SessionSettings {
            answer_duration_ms: 60_000,
            vote_duration_ms: 30_000,
            results_duration_ms: 10_000,
            max_teams: 12,
            group_size,
            total_rounds: 2,
            category_select: false,
        }
    }

    async fn app(group_size: usize) -> SharedState {
        let config = AppConfig::default()
            .with_session_defaults(settings(group_size))
            .with_blocked_words(vec!["darn".into()])
            .with_retry(RetryPolicy {
                max_attempts: 50,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(10),
            });
        AppState::with_store(config, Arc::new(MemorySessionStore::new())).await
    }

    async fn open(state: &SharedState, teams: usize) -> (Uuid, Vec<String>) {
        let created = create_session(
            state,
            CreateSessionRequest {
                host_id: "host".into(),
                team_name: "Quizmaster".into(),
                venue_name: Some("  The Crown ".into()),
                prompt_library_id: None,
            },
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for i in 0..teams {
            let id = format!("t{i}");
            join_session(
                state,
                JoinSessionRequest {
                    team_id: id.clone(),
                    code: created.code.to_lowercase(),
                    team_name: format!("Team {i}"),
                },
            )
            .await
            .unwrap();
            ids.push(id);
        }
        (created.session_id, ids)
    }

    async fn answer_all(state: &SharedState, id: Uuid, teams: &[String]) -> Vec<Uuid> {
        let mut answers = Vec::new();
        for team in teams {
            let response = submit_answer(state, id, team.clone(), format!("answer of {team}"))
                .await
                .unwrap();
            answers.push(response.answer_id);
        }
        answers
    }

    #[tokio::test]
    async fn create_and_join() {
        let state = app(4).await;
        let (id, teams) = open(&state, 2).await;
        let session = gateway::read_session(&state, id).await.unwrap();

        assert_eq!(session.venue_name.as_deref(), Some("The Crown"));
        assert_eq!(session.player_count(), 2);
        assert!(session.prompt_deck.remaining() > 0);

        let again = join_session(
            &state,
            JoinSessionRequest {
                team_id: teams[0].clone(),
                code: session.code.clone(),
                team_name: "Ignored".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(again.team.name, "Team 0");

        let err = join_session(
            &state,
            JoinSessionRequest {
                team_id: "t-x".into(),
                code: "ZZZZZZ".into(),
                team_name: "Lost".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn host_only_commands_reject_teams() {
        let state = app(4).await;
        let (id, teams) = open(&state, 2).await;
        let err = start_session(&state, id, teams[0].clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn scenario_a_answers_auto_advance_exactly_once() {
        let state = app(4).await;
        let (id, teams) = open(&state, 4).await;
        let mut events = state.sse().subscribe();

        let started = start_session(&state, id, "host".into()).await.unwrap();
        assert_eq!(started.phase, Phase::Answer);
        assert_eq!(started.round.as_ref().unwrap().groups.len(), 1);

        answer_all(&state, id, &teams).await;
        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Vote);
        assert_eq!(session.active_group_index, Some(0));

        let mut to_vote = 0;
        while let Ok(event) = events.try_recv() {
            if event.event.as_deref() == Some("phase.changed") && event.data.contains("\"to\":\"vote\"") {
                to_vote += 1;
            }
        }
        assert_eq!(to_vote, 1);
    }

    #[tokio::test]
    async fn scenario_b_scores_votes_and_winner_bonus() {
        let state = app(4).await;
        let (id, teams) = open(&state, 4).await;
        start_session(&state, id, "host".into()).await.unwrap();
        let answers = answer_all(&state, id, &teams).await;

        // t1 and t2 back t0, t3 backs t1, t0 abstains.
        submit_vote(&state, id, teams[1].clone(), answers[0]).await.unwrap();
        submit_vote(&state, id, teams[2].clone(), answers[0]).await.unwrap();
        submit_vote(&state, id, teams[3].clone(), answers[1]).await.unwrap();
        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Vote);

        let snapshot = advance_phase(&state, id, "host".into()).await.unwrap();
        assert_eq!(snapshot.phase, Phase::Results);

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.teams["t0"].score, 1200);
        assert_eq!(session.teams["t1"].score, 100);
        assert_eq!(session.teams["t2"].score, 0);
        assert_eq!(session.teams["t3"].score, 0);

        let board = public_service::leaderboard(&state, id, None).await.unwrap();
        let ranks = board.entries.iter().map(|e| e.rank).collect::<Vec<_>>();
        assert_eq!(ranks, vec![1, 2, 3, 3]);
    }

    #[tokio::test]
    async fn scenario_c_tied_winners_both_get_the_bonus() {
        let state = app(5).await;
        let (id, teams) = open(&state, 5).await;
        start_session(&state, id, "host".into()).await.unwrap();
        let answers = answer_all(&state, id, &teams).await;

        submit_vote(&state, id, teams[2].clone(), answers[0]).await.unwrap();
        submit_vote(&state, id, teams[3].clone(), answers[0]).await.unwrap();
        submit_vote(&state, id, teams[0].clone(), answers[1]).await.unwrap();
        submit_vote(&state, id, teams[4].clone(), answers[1]).await.unwrap();
        advance_phase(&state, id, "host".into()).await.unwrap();

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.teams["t0"].score, 1200);
        assert_eq!(session.teams["t1"].score, 1200);
        assert_eq!(session.teams["t2"].score, 0);
    }

    #[tokio::test]
    async fn scenario_d_late_joiner_gets_a_fresh_group() {
        let state = app(2).await;
        let (id, _) = open(&state, 4).await;
        start_session(&state, id, "host".into()).await.unwrap();

        let session = gateway::read_session(&state, id).await.unwrap();
        join_session(
            &state,
            JoinSessionRequest {
                team_id: "late".into(),
                code: session.code.clone(),
                team_name: "Latecomers".into(),
            },
        )
        .await
        .unwrap();

        let session = gateway::read_session(&state, id).await.unwrap();
        let round = session.current_round().unwrap();
        assert_eq!(round.groups.len(), 3);
        assert_eq!(round.groups[2].team_ids, vec!["late".to_string()]);
        let prompts = round.groups.iter().map(|g| g.prompt.as_str()).collect::<HashSet<_>>();
        assert_eq!(prompts.len(), 3);
    }

    #[tokio::test]
    async fn moderation_runs_before_the_transaction() {
        let state = app(4).await;
        let (id, teams) = open(&state, 2).await;
        start_session(&state, id, "host".into()).await.unwrap();

        let response = submit_answer(&state, id, teams[0].clone(), "Darn good".into())
            .await
            .unwrap();
        assert!(response.masked);
        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.answer_by_id(response.answer_id).unwrap().text, "**** good");

        let err = submit_answer(&state, id, teams[0].clone(), "   ".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn full_game_reaches_ended() {
        let state = app(4).await;
        let (id, teams) = open(&state, 2).await;
        start_session(&state, id, "host".into()).await.unwrap();

        for round in 0..2u32 {
            let answers = answer_all(&state, id, &teams).await;
            submit_vote(&state, id, teams[0].clone(), answers[1]).await.unwrap();
            submit_vote(&state, id, teams[1].clone(), answers[0]).await.unwrap();
            let session = gateway::read_session(&state, id).await.unwrap();
            assert_eq!(session.phase, Phase::Results, "round {round}");
            advance_phase(&state, id, "host".into()).await.unwrap();
        }

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Ended);
        assert_eq!(session.teams["t0"].score, 2 * 1100);
        assert_eq!(session.teams["t1"].score, 2 * 1100);
    }

    #[tokio::test]
    async fn category_pick_switches_the_prompt_library() {
        let mut defaults = settings(4);
        defaults.category_select = true;
        let config = AppConfig::default()
            .with_session_defaults(defaults)
            .with_prompt_library("office", vec!["Why is the stapler crying".into()]);
        let state = AppState::with_store(config, Arc::new(MemorySessionStore::new())).await;
        let (id, _) = open(&state, 2).await;

        let lobby = start_session(&state, id, "host".into()).await.unwrap();
        assert_eq!(lobby.phase, Phase::CategorySelect);

        let err = select_category(&state, id, "host".into(), "missing".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let session = select_category(&state, id, "host".into(), "office".into())
            .await
            .unwrap();
        assert_eq!(session.phase, Phase::Answer);
        let round = session.round.unwrap();
        assert_eq!(round.groups[0].prompt, "Why is the stapler crying");
    }

    fn phase_events(
        events: &mut tokio::sync::broadcast::Receiver<crate::dto::sse::ServerEvent>,
    ) -> Vec<serde_json::Value> {
        let mut changes = Vec::new();
        while let Ok(event) = events.try_recv() {
            if event.event.as_deref() == Some("phase.changed") {
                changes.push(serde_json::from_str(&event.data).unwrap());
            }
        }
        changes
    }

    #[tokio::test]
    async fn groups_vote_one_after_another() {
        let state = app(2).await;
        let (id, teams) = open(&state, 4).await;
        let mut events = state.sse().subscribe();
        start_session(&state, id, "host".into()).await.unwrap();
        answer_all(&state, id, &teams).await;

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Vote);
        assert_eq!(session.active_group_index, Some(0));
        let groups = session.current_round().unwrap().groups.clone();
        assert_eq!(groups.len(), 2);
        let answer_of = |team: &str| session.answer_for(team, 0).unwrap().id;
        let first_deadline = session.phase_deadline.unwrap();

        let changes = phase_events(&mut events);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1]["to"], "vote");
        assert_eq!(changes[1]["active_group_index"], 0);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let (a, b) = (&groups[0].team_ids[0], &groups[0].team_ids[1]);
        submit_vote(&state, id, a.clone(), answer_of(b)).await.unwrap();
        submit_vote(&state, id, b.clone(), answer_of(a)).await.unwrap();

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Vote);
        assert_eq!(session.active_group_index, Some(1));
        assert_eq!(session.scored_groups.len(), 1);
        assert!(session.phase_deadline.unwrap() > first_deadline);
        assert_eq!(session.teams[a.as_str()].score, 1100);
        assert_eq!(session.teams[b.as_str()].score, 1100);
        for team in &groups[1].team_ids {
            assert_eq!(session.teams[team.as_str()].score, 0);
        }

        let changes = phase_events(&mut events);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["from"], "vote");
        assert_eq!(changes[0]["to"], "vote");
        assert_eq!(changes[0]["active_group_index"], 1);

        let (c, d) = (&groups[1].team_ids[0], &groups[1].team_ids[1]);
        submit_vote(&state, id, c.clone(), answer_of(d)).await.unwrap();
        submit_vote(&state, id, d.clone(), answer_of(c)).await.unwrap();

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Results);
        assert_eq!(session.scored_groups.len(), 2);
        assert_eq!(session.teams[c.as_str()].score, 1100);
        let changes = phase_events(&mut events);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0]["to"], "results");

        let next = advance_phase(&state, id, "host".into()).await.unwrap();
        assert_eq!(next.phase, Phase::Answer);
        assert_eq!(next.round_index, 1);
        assert_eq!(next.round.unwrap().groups.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_final_votes_score_once() {
        let state = app(8).await;
        let (id, teams) = open(&state, 8).await;
        start_session(&state, id, "host".into()).await.unwrap();
        let answers = answer_all(&state, id, &teams).await;

        let mut handles = Vec::new();
        for (i, team) in teams.iter().enumerate() {
            let state = state.clone();
            let team = team.clone();
            let target = answers[(i + 1) % answers.len()];
            handles.push(tokio::spawn(async move {
                submit_vote(&state, id, team, target).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let session = gateway::read_session(&state, id).await.unwrap();
        assert_eq!(session.phase, Phase::Results);
        assert_eq!(session.scored_groups.len(), 1);
        let total: i64 = session.teams.values().map(|team| team.score).sum();
        assert_eq!(total, 8 * (100 + 1000));
    }
}
