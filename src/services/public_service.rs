//! Service helpers that expose read-only projections of a session.

use uuid::Uuid;

use crate::{
    dto::{
        leaderboard::{LeaderboardEntryDto, LeaderboardResponse, ScoreGapDto, TeamStandingResponse},
        sessions::SessionSnapshot,
    },
    error::ServiceError,
    services::gateway,
    state::{
        SharedState,
        leaderboard::Leaderboard,
        round_manager::find_group_for_team,
        scoring::{POINTS_PER_VOTE, WINNER_BONUS},
        session::GameSession,
        state_machine::Phase,
    },
};

/// Return the client-facing snapshot of a session.
pub async fn get_session(state: &SharedState, session_id: Uuid) -> Result<SessionSnapshot, ServiceError> {
    let session = gateway::read_session(state, session_id).await?;
    Ok(SessionSnapshot::from(&session))
}

/// Return the ranked teams, optionally limited to the first `top` entries.
pub async fn leaderboard(
    state: &SharedState,
    session_id: Uuid,
    top: Option<usize>,
) -> Result<LeaderboardResponse, ServiceError> {
    let session = gateway::read_session(state, session_id).await?;
    let board = Leaderboard::from_session(&session);
    let entries = match top {
        Some(n) => board.top(n),
        None => board.entries(),
    };

    Ok(LeaderboardResponse {
        session_id,
        entries: entries.iter().map(LeaderboardEntryDto::from).collect(),
        gaps: board.score_gaps().into_iter().map(ScoreGapDto::from).collect(),
    })
}

/// Return the standing of one team, including what it can still reach.
pub async fn team_standing(
    state: &SharedState,
    session_id: Uuid,
    team_id: &str,
) -> Result<TeamStandingResponse, ServiceError> {
    let session = gateway::read_session(state, session_id).await?;
    standing(&session, team_id)
}

fn standing(session: &GameSession, team_id: &str) -> Result<TeamStandingResponse, ServiceError> {
    let board = Leaderboard::from_session(session);
    let entry = board
        .entry(team_id)
        .ok_or_else(|| ServiceError::NotFound(format!("team {team_id} is not ranked in this session")))?;
    let max_remaining = max_remaining_points(session, team_id);

    Ok(TeamStandingResponse {
        team_id: entry.team_id.clone(),
        name: entry.name.clone(),
        score: entry.score,
        rank: entry.rank,
        tied_with: board
            .tied_at(entry.rank)
            .into_iter()
            .filter(|other| other.team_id != entry.team_id)
            .map(|other| other.team_id.clone())
            .collect(),
        gap_to_next_rank: board.gap_to_next_rank(team_id),
        max_remaining_points: max_remaining,
        best_possible_rank: board
            .best_possible_rank(team_id, max_remaining)
            .unwrap_or(entry.rank),
    })
}

/// Most points `team_id` can still earn: every vote of its group plus the winner bonus,
/// for the current round while its group is unscored and for every later round.
pub fn max_remaining_points(session: &GameSession, team_id: &str) -> i64 {
    let round_index = session.round_index;
    let current_open = match session.phase {
        Phase::Lobby | Phase::CategorySelect | Phase::Answer => true,
        Phase::Vote | Phase::Results => session
            .current_round()
            .and_then(|round| find_group_for_team(round, team_id))
            .is_some_and(|(_, group)| !session.is_group_scored(round_index, group.id)),
        Phase::Ended => return 0,
    };

    let later_rounds = session
        .settings
        .total_rounds
        .saturating_sub(round_index + 1) as i64;
    let rounds = later_rounds + i64::from(current_open);
    let voters = session.settings.group_size.saturating_sub(1) as i64;

    rounds * (voters * POINTS_PER_VOTE + WINNER_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::{
        ScoredGroup,
        tests::{lobby_with_players, stage_round, team_id},
    };

    #[test]
    fn remaining_points_shrink_as_groups_are_scored() {
        let mut session = lobby_with_players(4);
        // group_size 4, two rounds: 3 * 100 + 1000 per round.
        assert_eq!(max_remaining_points(&session, &team_id(0)), 2 * 1300);

        stage_round(&mut session, 2);
        session.phase = Phase::Vote;
        session.active_group_index = Some(0);
        let first_group = session.current_round().unwrap().groups[0].id;
        session.scored_groups.push(ScoredGroup {
            round_index: 0,
            group_id: first_group,
        });
        assert_eq!(max_remaining_points(&session, &team_id(0)), 1300);
        assert_eq!(max_remaining_points(&session, &team_id(2)), 2 * 1300);

        session.round_index = 1;
        session.phase = Phase::Ended;
        assert_eq!(max_remaining_points(&session, &team_id(2)), 0);
    }

    #[test]
    fn standing_reports_ties_gaps_and_reach() {
        let mut session = lobby_with_players(4);
        for (index, score) in [1200, 1200, 100, 0].into_iter().enumerate() {
            session.teams[&team_id(index)].score = score;
        }
        session.round_index = 1;
        session.phase = Phase::Answer;

        let leader = standing(&session, &team_id(0)).unwrap();
        assert_eq!(leader.rank, 1);
        assert_eq!(leader.tied_with, vec![team_id(1)]);
        assert_eq!(leader.gap_to_next_rank, None);

        let last = standing(&session, &team_id(3)).unwrap();
        assert_eq!(last.rank, 4);
        assert_eq!(last.gap_to_next_rank, Some(100));
        assert_eq!(last.max_remaining_points, 1300);
        assert_eq!(last.best_possible_rank, 1);

        assert!(matches!(
            standing(&session, "host"),
            Err(ServiceError::NotFound(_))
        ));
    }
}
