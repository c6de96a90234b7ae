//! Vote tallying and score application.

use tracing::info;
use uuid::Uuid;

use crate::state::session::{GameSession, Group, ScoredGroup, TeamId};

/// Points granted for every vote an answer receives.
pub const POINTS_PER_VOTE: i64 = 100;
/// Flat bonus for every answer tied at the highest (non-zero) vote count.
pub const WINNER_BONUS: i64 = 1000;

/// Votes received by one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerTally {
    /// Counted answer.
    pub answer_id: Uuid,
    /// Author of the answer.
    pub team_id: TeamId,
    /// Number of votes.
    pub votes: u32,
}

/// Vote counts of one group once its window closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupTally {
    /// Round of the group.
    pub round_index: u32,
    /// Tallied group.
    pub group_id: Uuid,
    /// Every answer of the group, in submission order.
    pub answers: Vec<AnswerTally>,
    /// Highest count, zero when nobody voted.
    pub max_votes: u32,
    /// Answers at `max_votes`; empty when `max_votes` is zero.
    pub winners: Vec<Uuid>,
}

/// Points earned by one team from one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDelta {
    /// Receiving team.
    pub team_id: TeamId,
    /// Answer that earned the points.
    pub answer_id: Uuid,
    /// Total points.
    pub points: i64,
    /// Whether the winner bonus is included.
    pub winner: bool,
}

/// Outcome of scoring a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    /// Tally the deltas were computed from.
    pub tally: GroupTally,
    /// Applied deltas.
    pub deltas: Vec<ScoreDelta>,
}

/// Count the votes of a group.
pub fn tally_group(session: &GameSession, round_index: u32, group_id: Uuid) -> GroupTally {
    let mut answers = session
        .group_answers(round_index, group_id)
        .map(|answer| AnswerTally {
            answer_id: answer.id,
            team_id: answer.team_id.clone(),
            votes: 0,
        })
        .collect::<Vec<_>>();

    for vote in session.group_votes(round_index, group_id) {
        if let Some(entry) = answers
            .iter_mut()
            .find(|entry| entry.answer_id == vote.answer_id)
        {
            entry.votes += 1;
        }
    }

    let max_votes = answers.iter().map(|entry| entry.votes).max().unwrap_or(0);
    let winners = if max_votes == 0 {
        Vec::new()
    } else {
        answers
            .iter()
            .filter(|entry| entry.votes == max_votes)
            .map(|entry| entry.answer_id)
            .collect()
    };

    GroupTally {
        round_index,
        group_id,
        answers,
        max_votes,
        winners,
    }
}

/// Convert a tally into per-team points; ties all receive the full bonus.
pub fn score_deltas(tally: &GroupTally) -> Vec<ScoreDelta> {
    tally
        .answers
        .iter()
        .filter(|entry| entry.votes > 0)
        .map(|entry| {
            let winner = tally.winners.contains(&entry.answer_id);
            let bonus = if winner { WINNER_BONUS } else { 0 };
            ScoreDelta {
                team_id: entry.team_id.clone(),
                answer_id: entry.answer_id,
                points: i64::from(entry.votes) * POINTS_PER_VOTE + bonus,
                winner,
            }
        })
        .collect()
}

/// Tally a group and add the points to the teams, once.
///
/// Returns `None` when the group already appears in the scored ledger.
pub fn apply_group_score(
    session: &mut GameSession,
    round_index: u32,
    group_id: Uuid,
) -> Option<ScoreReport> {
    if session.is_group_scored(round_index, group_id) {
        return None;
    }

    let tally = tally_group(session, round_index, group_id);
    let deltas = score_deltas(&tally);
    for delta in &deltas {
        if let Some(team) = session.teams.get_mut(&delta.team_id) {
            team.score += delta.points;
        }
    }
    session.scored_groups.push(ScoredGroup {
        round_index,
        group_id,
    });

    info!(
        session_id = %session.id,
        round_index,
        group_id = %group_id,
        max_votes = tally.max_votes,
        winners = tally.winners.len(),
        "group scored"
    );

    Some(ScoreReport { tally, deltas })
}

/// Members of `group` that have at least one answer from someone else to vote for.
pub fn eligible_voters<'a>(
    session: &'a GameSession,
    round_index: u32,
    group: &'a Group,
) -> impl Iterator<Item = &'a TeamId> + 'a {
    group.team_ids.iter().filter(move |id| {
        session.is_player(id)
            && session
                .group_answers(round_index, group.id)
                .any(|answer| &answer.team_id != *id)
    })
}

/// Every eligible voter of `group` has voted.
pub fn is_group_vote_complete(session: &GameSession, round_index: u32, group: &Group) -> bool {
    eligible_voters(session, round_index, group).all(|voter| {
        session
            .votes
            .contains_key(&(voter.clone(), round_index, group.id))
    })
}
