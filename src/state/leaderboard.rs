//! Standard competition ranking over team scores.

use crate::state::session::{GameSession, TeamId};

/// One ranked team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    /// Ranked team.
    pub team_id: TeamId,
    /// Display name.
    pub name: String,
    /// Cumulative score.
    pub score: i64,
    /// 1-based rank; tied scores share a rank.
    pub rank: usize,
}

/// Points separating two neighbouring distinct ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreGap {
    /// Better rank.
    pub rank: usize,
    /// Next distinct rank below it.
    pub next_rank: usize,
    /// Score difference between both.
    pub points: i64,
}

/// Leaderboard snapshot, recomputed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Leaderboard {
    entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Rank arbitrary `(team, name, score)` triples.
    pub fn from_scores<I>(scores: I) -> Self
    where
        I: IntoIterator<Item = (TeamId, String, i64)>,
    {
        let mut entries = scores
            .into_iter()
            .map(|(team_id, name, score)| LeaderboardEntry {
                team_id,
                name,
                score,
                rank: 0,
            })
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.team_id.cmp(&b.team_id))
        });

        let mut previous: Option<(i64, usize)> = None;
        for (index, entry) in entries.iter_mut().enumerate() {
            entry.rank = match previous {
                Some((score, rank)) if score == entry.score => rank,
                _ => index + 1,
            };
            previous = Some((entry.score, entry.rank));
        }

        Self { entries }
    }

    /// Rank every non-host team of the session.
    pub fn from_session(session: &GameSession) -> Self {
        Self::from_scores(
            session
                .players()
                .map(|team| (team.id.clone(), team.name.clone(), team.score)),
        )
    }

    /// Entries, best first.
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    /// Entry of `team_id`.
    pub fn entry(&self, team_id: &str) -> Option<&LeaderboardEntry> {
        self.entries.iter().find(|entry| entry.team_id == team_id)
    }

    /// Rank of `team_id`.
    pub fn rank_of(&self, team_id: &str) -> Option<usize> {
        self.entry(team_id).map(|entry| entry.rank)
    }

    /// First `n` entries.
    pub fn top(&self, n: usize) -> &[LeaderboardEntry] {
        &self.entries[..n.min(self.entries.len())]
    }

    /// Entries whose rank lies in `from..=to`.
    pub fn in_rank_range(&self, from: usize, to: usize) -> Vec<&LeaderboardEntry> {
        self.entries
            .iter()
            .filter(|entry| (from..=to).contains(&entry.rank))
            .collect()
    }

    /// Entries sharing `rank`.
    pub fn tied_at(&self, rank: usize) -> Vec<&LeaderboardEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.rank == rank)
            .collect()
    }

    /// Differences between each pair of consecutive distinct ranks.
    pub fn score_gaps(&self) -> Vec<ScoreGap> {
        let mut gaps = Vec::new();
        let mut previous: Option<&LeaderboardEntry> = None;
        for entry in &self.entries {
            if let Some(better) = previous.filter(|better| better.rank != entry.rank) {
                gaps.push(ScoreGap {
                    rank: better.rank,
                    next_rank: entry.rank,
                    points: better.score - entry.score,
                });
            }
            if previous.is_none_or(|better| better.rank != entry.rank) {
                previous = Some(entry);
            }
        }
        gaps
    }

    /// Points `team_id` needs to catch up with the next better rank.
    pub fn gap_to_next_rank(&self, team_id: &str) -> Option<i64> {
        let entry = self.entry(team_id)?;
        self.entries
            .iter()
            .filter(|other| other.score > entry.score)
            .map(|other| other.score - entry.score)
            .min()
    }

    /// Best rank reachable if `team_id` earned `max_remaining` more points while
    /// nobody else scored.
    pub fn best_possible_rank(&self, team_id: &str, max_remaining: i64) -> Option<usize> {
        let entry = self.entry(team_id)?;
        let ceiling = entry.score + max_remaining;
        let ahead = self
            .entries
            .iter()
            .filter(|other| other.team_id != entry.team_id && other.score > ceiling)
            .count();
        Some(ahead + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(scores: &[i64]) -> Leaderboard {
        Leaderboard::from_scores(
            scores
                .iter()
                .enumerate()
                .map(|(i, score)| (format!("team-{i}"), format!("Team {i}"), *score)),
        )
    }

    fn ranks(board: &Leaderboard) -> Vec<usize> {
        board.entries().iter().map(|entry| entry.rank).collect()
    }

    #[test]
    fn ties_share_rank_and_skip_following() {
        assert_eq!(ranks(&board(&[1200, 1200, 100, 0])), vec![1, 1, 3, 4]);
        assert_eq!(ranks(&board(&[500, 500, 300])), vec![1, 1, 3]);
        assert_eq!(ranks(&board(&[0, 0, 0])), vec![1, 1, 1]);
        assert!(board(&[]).entries().is_empty());
    }

    #[test]
    fn ordering_matches_scores() {
        let board = board(&[10, 700, 300, 700, 10, 50]);
        for a in board.entries() {
            for b in board.entries() {
                if a.score == b.score {
                    assert_eq!(a.rank, b.rank);
                } else if a.score > b.score {
                    assert!(a.rank < b.rank);
                }
            }
        }
    }

    #[test]
    fn queries() {
        let board = board(&[1200, 1200, 100, 0]);
        assert_eq!(board.rank_of("team-2"), Some(3));
        assert_eq!(board.rank_of("nobody"), None);
        assert_eq!(board.top(2).len(), 2);
        assert_eq!(board.top(10).len(), 4);
        assert_eq!(board.tied_at(1).len(), 2);
        assert!(board.tied_at(2).is_empty());
        assert_eq!(board.in_rank_range(1, 3).len(), 3);
    }

    #[test]
    fn gaps_between_distinct_ranks() {
        let board = board(&[1200, 1200, 100, 0]);
        assert_eq!(
            board.score_gaps(),
            vec![
                ScoreGap {
                    rank: 1,
                    next_rank: 3,
                    points: 1100,
                },
                ScoreGap {
                    rank: 3,
                    next_rank: 4,
                    points: 100,
                },
            ]
        );
        assert_eq!(board.gap_to_next_rank("team-3"), Some(100));
        assert_eq!(board.gap_to_next_rank("team-0"), None);
    }

    #[test]
    fn best_possible_rank_counts_unreachable_teams() {
        let board = board(&[3000, 1200, 100, 0]);
        assert_eq!(board.best_possible_rank("team-3", 0), Some(4));
        assert_eq!(board.best_possible_rank("team-3", 1200), Some(2));
        assert_eq!(board.best_possible_rank("team-3", 5000), Some(1));
        assert_eq!(board.best_possible_rank("team-0", 0), Some(1));
        assert_eq!(board.best_possible_rank("nobody", 0), None);
    }
}
