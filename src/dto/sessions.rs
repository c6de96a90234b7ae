use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_timestamp,
        validation::{validate_identity, validate_not_blank},
    },
    state::{
        session::{GameSession, Group, Team},
        state_machine::Phase,
    },
};

/// Payload opening a new session; the caller becomes its host.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    #[validate(custom(function = "validate_identity"))]
    pub host_id: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub team_name: String,
    #[validate(length(max = 80))]
    pub venue_name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub prompt_library_id: Option<String>,
}

/// Payload joining a session by its code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(custom(function = "validate_identity"))]
    pub team_id: String,
    #[validate(length(min = 4, max = 12))]
    pub code: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub team_name: String,
}

/// Host-only command without further arguments.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct HostCommandRequest {
    #[validate(custom(function = "validate_identity"))]
    pub host_id: String,
}

/// Freeze (`pause = true`) or resume the session clock.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct PauseRequest {
    #[validate(custom(function = "validate_identity"))]
    pub host_id: String,
    pub pause: bool,
}

/// Prompt library picked during category selection.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SelectCategoryRequest {
    #[validate(custom(function = "validate_identity"))]
    pub host_id: String,
    #[validate(length(min = 1, max = 64))]
    pub prompt_library_id: String,
}

/// Host command targeting one team (kick or ban).
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct TeamCommandRequest {
    #[validate(custom(function = "validate_identity"))]
    pub host_id: String,
    #[validate(custom(function = "validate_identity"))]
    pub team_id: String,
}

/// Answer for the current round.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(custom(function = "validate_identity"))]
    pub team_id: String,
    #[validate(length(min = 1, max = 2000), custom(function = "validate_not_blank"))]
    pub text: String,
}

/// Vote for an answer of the group currently voting.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitVoteRequest {
    #[validate(custom(function = "validate_identity"))]
    pub team_id: String,
    pub answer_id: Uuid,
}

/// Returned by `POST /sessions`.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub code: String,
    pub session: SessionSnapshot,
    pub team: TeamSummary,
}

/// Returned by `POST /sessions/join`.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    pub session_id: Uuid,
    pub session: SessionSnapshot,
    pub team: TeamSummary,
}

/// Session after a host command.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub session: SessionSnapshot,
}

/// Bare acknowledgement.
#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    /// Positive acknowledgement.
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Acknowledgement of an accepted answer.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub success: bool,
    pub answer_id: Uuid,
    /// Part of the text was masked by moderation.
    pub masked: bool,
    /// The text was cut to the configured length.
    pub truncated: bool,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
/// Public projection of a team.
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub score: i64,
    pub is_host: bool,
    pub joined_at: String,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id.clone(),
            name: team.name.clone(),
            score: team.score,
            is_host: team.is_host,
            joined_at: format_timestamp(team.joined_at),
        }
    }
}

/// Answer as shown to clients; authorship and votes stay hidden until the group is scored.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerSnapshot {
    pub id: Uuid,
    pub text: String,
    pub masked: bool,
    pub team_id: Option<String>,
    pub votes: Option<usize>,
}

/// One group of the current round.
#[derive(Debug, Serialize, ToSchema)]
pub struct GroupSnapshot {
    pub id: Uuid,
    pub prompt: String,
    pub team_ids: Vec<String>,
    /// Teams that have answered, without their text.
    pub answered: Vec<String>,
    /// Answers, once answering is over.
    pub answers: Vec<AnswerSnapshot>,
    pub votes_cast: usize,
    pub scored: bool,
}

/// The current round.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSnapshot {
    pub index: u32,
    /// Shared prompt when the whole round plays one group.
    pub prompt: Option<String>,
    pub groups: Vec<GroupSnapshot>,
}

/// Full client-facing view of a session.
#[skip_serializing_none]
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub code: String,
    pub host_id: String,
    pub venue_name: Option<String>,
    pub phase: Phase,
    pub round_index: u32,
    pub total_rounds: u32,
    pub active_group_index: Option<usize>,
    pub paused: bool,
    pub phase_deadline: Option<String>,
    pub paused_remaining_ms: Option<u64>,
    pub teams: Vec<TeamSummary>,
    pub round: Option<RoundSnapshot>,
    pub created_at: String,
    pub updated_at: String,
    pub ended_at: Option<String>,
}

impl From<&GameSession> for SessionSnapshot {
    fn from(session: &GameSession) -> Self {
        let round = session.current_round().map(|round| RoundSnapshot {
            index: session.round_index,
            prompt: round.prompt.clone(),
            groups: round
                .groups
                .iter()
                .map(|group| group_snapshot(session, group))
                .collect(),
        });

        Self {
            id: session.id,
            code: session.code.clone(),
            host_id: session.host_id.clone(),
            venue_name: session.venue_name.clone(),
            phase: session.phase,
            round_index: session.round_index,
            total_rounds: session.settings.total_rounds,
            active_group_index: session.active_group_index,
            paused: session.is_paused(),
            phase_deadline: session.phase_deadline.map(format_timestamp),
            paused_remaining_ms: session.paused_remaining_ms,
            teams: session.teams.values().map(TeamSummary::from).collect(),
            round,
            created_at: format_timestamp(session.created_at),
            updated_at: format_timestamp(session.updated_at),
            ended_at: session.ended_at.map(format_timestamp),
        }
    }
}

fn group_snapshot(session: &GameSession, group: &Group) -> GroupSnapshot {
    let round_index = session.round_index;
    let scored = session.is_group_scored(round_index, group.id);
    let answers_visible = !matches!(session.phase, Phase::Lobby | Phase::CategorySelect | Phase::Answer);
    let votes = session.group_votes(round_index, group.id).collect::<Vec<_>>();

    let answers = if answers_visible {
        session
            .group_answers(round_index, group.id)
            .map(|answer| AnswerSnapshot {
                id: answer.id,
                text: answer.text.clone(),
                masked: answer.masked,
                team_id: scored.then(|| answer.team_id.clone()),
                votes: scored.then(|| {
                    votes
                        .iter()
                        .filter(|vote| vote.answer_id == answer.id)
                        .count()
                }),
            })
            .collect()
    } else {
        Vec::new()
    };

    GroupSnapshot {
        id: group.id,
        prompt: group.prompt.clone(),
        team_ids: group.team_ids.clone(),
        answered: session
            .group_answers(round_index, group.id)
            .map(|answer| answer.team_id.clone())
            .collect(),
        answers,
        votes_cast: votes.len(),
        scored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::session::tests::{lobby_with_players, stage_round, team_id};

    #[test]
    fn authors_stay_hidden_until_the_group_is_scored() {
        let mut session = lobby_with_players(3);
        stage_round(&mut session, 4);
        let answer_id = session.insert_test_answer(&team_id(0), 0);
        session.insert_test_answer(&team_id(1), 0);

        session.phase = Phase::Answer;
        let snapshot = SessionSnapshot::from(&session);
        let group = &snapshot.round.as_ref().unwrap().groups[0];
        assert!(group.answers.is_empty());
        assert_eq!(group.answered, vec![team_id(0), team_id(1)]);

        session.phase = Phase::Vote;
        session.active_group_index = Some(0);
        session.insert_test_vote(&team_id(1), answer_id);
        let snapshot = SessionSnapshot::from(&session);
        let json = serde_json::to_value(&snapshot).unwrap();
        let answer = &json["round"]["groups"][0]["answers"][0];
        assert!(answer.get("team_id").is_none());
        assert!(answer.get("votes").is_none());
        assert_eq!(json["phase"], "vote");

        let group_id = session.current_round().unwrap().groups[0].id;
        session.scored_groups.push(crate::state::session::ScoredGroup {
            round_index: 0,
            group_id,
        });
        let round = SessionSnapshot::from(&session).round.unwrap();
        let answer = &round.groups[0].answers[0];
        assert_eq!(answer.team_id.as_deref(), Some(team_id(0).as_str()));
        assert_eq!(answer.votes, Some(1));
    }

    #[test]
    fn create_request_validation() {
        let request: CreateSessionRequest = serde_json::from_str(
            r#"{"host_id": "host-1", "team_name": "  ", "venue_name": null, "prompt_library_id": null}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());

        let request: CreateSessionRequest =
            serde_json::from_str(r#"{"host_id": "host-1", "team_name": "Hosts"}"#).unwrap();
        assert!(request.validate().is_ok());
    }
}
