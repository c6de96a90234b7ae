use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::state::leaderboard::{LeaderboardEntry, ScoreGap};

/// Query parameters of the leaderboard route.
#[derive(Debug, Default, Deserialize, IntoParams, Validate)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Only return the first `top` entries.
    #[validate(range(min = 1, max = 500))]
    pub top: Option<usize>,
}

/// One ranked team.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntryDto {
    pub team_id: String,
    pub name: String,
    pub score: i64,
    pub rank: usize,
}

impl From<&LeaderboardEntry> for LeaderboardEntryDto {
    fn from(entry: &LeaderboardEntry) -> Self {
        Self {
            team_id: entry.team_id.clone(),
            name: entry.name.clone(),
            score: entry.score,
            rank: entry.rank,
        }
    }
}

/// Points between two consecutive distinct ranks.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreGapDto {
    pub rank: usize,
    pub next_rank: usize,
    pub points: i64,
}

impl From<ScoreGap> for ScoreGapDto {
    fn from(gap: ScoreGap) -> Self {
        Self {
            rank: gap.rank,
            next_rank: gap.next_rank,
            points: gap.points,
        }
    }
}

/// Ranked teams of a session.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub session_id: Uuid,
    pub entries: Vec<LeaderboardEntryDto>,
    pub gaps: Vec<ScoreGapDto>,
}

/// Standing of one team.
#[derive(Debug, Serialize, ToSchema)]
pub struct TeamStandingResponse {
    pub team_id: String,
    pub name: String,
    pub score: i64,
    pub rank: usize,
    /// Teams sharing the rank, this one excluded.
    pub tied_with: Vec<String>,
    /// Points needed to reach the next better rank; absent when leading.
    pub gap_to_next_rank: Option<i64>,
    /// Points the team can still earn in the remaining rounds.
    pub max_remaining_points: i64,
    /// Best rank reachable with those points.
    pub best_possible_rank: usize,
}
