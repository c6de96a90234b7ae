use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{
    round_manager::PromptDeck,
    session::{Answer, GameSession, Group, Round, ScoredGroup, SessionSettings, Team, Vote},
    state_machine::Phase,
};

/// Opaque optimistic-concurrency token issued by a store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(pub String);

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    /// Stored value.
    pub value: T,
    /// Revision to pass back when committing a change.
    pub revision: Revision,
}

/// Aggregate session entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Upper-case join code.
    pub code: String,
    /// Identity of the host.
    pub host_id: String,
    /// Optional venue label.
    pub venue_name: Option<String>,
    /// Prompt library used for the deck.
    pub prompt_library_id: Option<String>,
    /// Current phase.
    pub phase: Phase,
    /// Current round.
    pub round_index: u32,
    /// Rounds played so far.
    pub rounds: Vec<RoundEntity>,
    /// Group currently voting.
    pub active_group_index: Option<usize>,
    /// Session tunables.
    pub settings: SettingsEntity,
    /// Teams in join order.
    pub teams: Vec<TeamEntity>,
    /// Every answer of every round.
    pub answers: Vec<AnswerEntity>,
    /// Every vote of every round.
    pub votes: Vec<VoteEntity>,
    /// Banned identities.
    pub banned: Vec<String>,
    /// Prompt deck state.
    pub prompt_deck: PromptDeckEntity,
    /// Groups already scored.
    pub scored_groups: Vec<ScoredGroupEntity>,
    /// Pause start, when paused.
    #[serde(with = "time::serde::rfc3339::option")]
    pub paused_at: Option<OffsetDateTime>,
    /// Deadline budget frozen by the pause.
    pub paused_remaining_ms: Option<u64>,
    /// Accumulated pause time.
    pub total_paused_ms: u64,
    /// Deadline of the current phase.
    #[serde(with = "time::serde::rfc3339::option")]
    pub phase_deadline: Option<OffsetDateTime>,
    /// Creation timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last committed change.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// End of the session.
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

/// Persisted [`SessionSettings`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SettingsEntity {
    pub answer_duration_ms: u64,
    pub vote_duration_ms: u64,
    pub results_duration_ms: u64,
    pub max_teams: usize,
    pub group_size: usize,
    pub total_rounds: u32,
    pub category_select: bool,
}

/// Persisted [`Round`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    pub prompt: Option<String>,
    pub groups: Vec<GroupEntity>,
}

/// Persisted [`Group`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntity {
    pub id: Uuid,
    pub prompt: String,
    pub team_ids: Vec<String>,
}

/// Representation of a team stored in persistence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamEntity {
    /// Identity of the team.
    pub id: String,
    /// Display name chosen for the team.
    pub name: String,
    /// Host flag.
    pub is_host: bool,
    /// Current score for the team.
    pub score: i64,
    /// Join timestamp.
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    /// Last accepted submission.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_active_at: Option<OffsetDateTime>,
}

/// Persisted [`Answer`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    pub id: Uuid,
    pub team_id: String,
    pub round_index: u32,
    pub group_id: Uuid,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub masked: bool,
}

/// Persisted [`Vote`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteEntity {
    pub voter_id: String,
    pub round_index: u32,
    pub group_id: Uuid,
    pub answer_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Persisted [`PromptDeck`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PromptDeckEntity {
    pub pool: Vec<String>,
    pub cards: Vec<String>,
    pub cursor: usize,
}

/// Persisted [`ScoredGroup`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoredGroupEntity {
    pub round_index: u32,
    pub group_id: Uuid,
}

impl From<&GameSession> for SessionEntity {
    fn from(session: &GameSession) -> Self {
        let settings = &session.settings;
        Self {
            id: session.id,
            code: session.code.clone(),
            host_id: session.host_id.clone(),
            venue_name: session.venue_name.clone(),
            prompt_library_id: session.prompt_library_id.clone(),
            phase: session.phase,
            round_index: session.round_index,
            rounds: session
                .rounds
                .iter()
                .map(|round| RoundEntity {
                    prompt: round.prompt.clone(),
                    groups: round
                        .groups
                        .iter()
                        .map(|group| GroupEntity {
                            id: group.id,
                            prompt: group.prompt.clone(),
                            team_ids: group.team_ids.clone(),
                        })
                        .collect(),
                })
                .collect(),
            active_group_index: session.active_group_index,
            settings: SettingsEntity {
                answer_duration_ms: settings.answer_duration_ms,
                vote_duration_ms: settings.vote_duration_ms,
                results_duration_ms: settings.results_duration_ms,
                max_teams: settings.max_teams,
                group_size: settings.group_size,
                total_rounds: settings.total_rounds,
                category_select: settings.category_select,
            },
            teams: session
                .teams
                .values()
                .map(|team| TeamEntity {
                    id: team.id.clone(),
                    name: team.name.clone(),
                    is_host: team.is_host,
                    score: team.score,
                    joined_at: team.joined_at,
                    last_active_at: team.last_active_at,
                })
                .collect(),
            answers: session
                .answers
                .values()
                .map(|answer| AnswerEntity {
                    id: answer.id,
                    team_id: answer.team_id.clone(),
                    round_index: answer.round_index,
                    group_id: answer.group_id,
                    text: answer.text.clone(),
                    created_at: answer.created_at,
                    masked: answer.masked,
                })
                .collect(),
            votes: session
                .votes
                .values()
                .map(|vote| VoteEntity {
                    voter_id: vote.voter_id.clone(),
                    round_index: vote.round_index,
                    group_id: vote.group_id,
                    answer_id: vote.answer_id,
                    created_at: vote.created_at,
                })
                .collect(),
            banned: session.banned.clone(),
            prompt_deck: PromptDeckEntity {
                pool: session.prompt_deck.pool.clone(),
                cards: session.prompt_deck.cards.clone(),
                cursor: session.prompt_deck.cursor,
            },
            scored_groups: session
                .scored_groups
                .iter()
                .map(|scored| ScoredGroupEntity {
                    round_index: scored.round_index,
                    group_id: scored.group_id,
                })
                .collect(),
            paused_at: session.paused_at,
            paused_remaining_ms: session.paused_remaining_ms,
            total_paused_ms: session.total_paused_ms,
            phase_deadline: session.phase_deadline,
            created_at: session.created_at,
            updated_at: session.updated_at,
            ended_at: session.ended_at,
        }
    }
}

impl From<SessionEntity> for GameSession {
    fn from(entity: SessionEntity) -> Self {
        let SettingsEntity {
            answer_duration_ms,
            vote_duration_ms,
            results_duration_ms,
            max_teams,
            group_size,
            total_rounds,
            category_select,
        } = entity.settings;

        Self {
            id: entity.id,
            code: entity.code,
            host_id: entity.host_id,
            venue_name: entity.venue_name,
            prompt_library_id: entity.prompt_library_id,
            phase: entity.phase,
            round_index: entity.round_index,
            rounds: entity
                .rounds
                .into_iter()
                .map(|round| Round {
                    prompt: round.prompt,
                    groups: round
                        .groups
                        .into_iter()
                        .map(|group| Group {
                            id: group.id,
                            prompt: group.prompt,
                            team_ids: group.team_ids,
                        })
                        .collect(),
                })
                .collect(),
            active_group_index: entity.active_group_index,
            settings: SessionSettings {
                answer_duration_ms,
                vote_duration_ms,
                results_duration_ms,
                max_teams,
                group_size,
                total_rounds,
                category_select,
            },
            teams: entity
                .teams
                .into_iter()
                .map(|team| {
                    (
                        team.id.clone(),
                        Team {
                            id: team.id,
                            name: team.name,
                            is_host: team.is_host,
                            score: team.score,
                            joined_at: team.joined_at,
                            last_active_at: team.last_active_at,
                        },
                    )
                })
                .collect::<IndexMap<_, _>>(),
            answers: entity
                .answers
                .into_iter()
                .map(|answer| {
                    (
                        (answer.team_id.clone(), answer.round_index),
                        Answer {
                            id: answer.id,
                            team_id: answer.team_id,
                            round_index: answer.round_index,
                            group_id: answer.group_id,
                            text: answer.text,
                            created_at: answer.created_at,
                            masked: answer.masked,
                        },
                    )
                })
                .collect(),
            votes: entity
                .votes
                .into_iter()
                .map(|vote| {
                    (
                        (vote.voter_id.clone(), vote.round_index, vote.group_id),
                        Vote {
                            voter_id: vote.voter_id,
                            round_index: vote.round_index,
                            group_id: vote.group_id,
                            answer_id: vote.answer_id,
                            created_at: vote.created_at,
                        },
                    )
                })
                .collect(),
            banned: entity.banned,
            prompt_deck: PromptDeck {
                pool: entity.prompt_deck.pool,
                cards: entity.prompt_deck.cards,
                cursor: entity.prompt_deck.cursor,
            },
            scored_groups: entity
                .scored_groups
                .into_iter()
                .map(|scored| ScoredGroup {
                    round_index: scored.round_index,
                    group_id: scored.group_id,
                })
                .collect(),
            paused_at: entity.paused_at,
            paused_remaining_ms: entity.paused_remaining_ms,
            total_paused_ms: entity.total_paused_ms,
            phase_deadline: entity.phase_deadline,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            ended_at: entity.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::tests::{lobby_with_players, stage_round};

    #[test]
    fn entity_preserves_the_aggregate() {
        let mut session = lobby_with_players(3);
        stage_round(&mut session, 2);
        session.phase = Phase::Vote;
        session.active_group_index = Some(0);
        let answer = session.insert_test_answer("team-0", 0);
        session.insert_test_answer("team-1", 0);
        session.insert_test_vote("team-1", answer);
        session.banned.push("troll".into());

        let entity = SessionEntity::from(&session);
        let json = serde_json::to_string(&entity).unwrap();
        assert!(json.contains("\"phase\":\"vote\""));
        assert!(json.contains("1970-01-01T00:00:00Z"));

        let decoded: SessionEntity = serde_json::from_str(&json).unwrap();
        assert_eq!(GameSession::from(decoded), session);
    }
}
