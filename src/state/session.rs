//! Aggregate data model of a running session: teams, rounds, groups, answers and votes.
//!
//! A [`GameSession`] is always loaded, mutated and committed as a whole by the
//! transaction gateway, so every helper in here is synchronous and side-effect free
//! apart from the `&mut self` it receives.

use std::time::Duration;

use indexmap::IndexMap;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::state::{round_manager::PromptDeck, state_machine::Phase};

/// Identity of a team as issued by the external identity provider.
pub type TeamId = String;
/// Answers are unique per team and round.
pub type AnswerKey = (TeamId, u32);
/// Votes are unique per voter, round and group.
pub type VoteKey = (TeamId, u32, Uuid);

/// Tunables chosen when the session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Time teams get to write an answer.
    pub answer_duration_ms: u64,
    /// Time each group gets to vote.
    pub vote_duration_ms: u64,
    /// Time results stay on screen.
    pub results_duration_ms: u64,
    /// Maximum number of non-host teams.
    pub max_teams: usize,
    /// Preferred number of teams per group.
    pub group_size: usize,
    /// Number of rounds before the session ends.
    pub total_rounds: u32,
    /// Whether the host picks a category before the first round.
    pub category_select: bool,
}

impl SessionSettings {
    /// Length of the window for `phase`, if that phase is timed.
    pub fn phase_duration(&self, phase: Phase) -> Option<Duration> {
        let millis = match phase {
            Phase::Answer => self.answer_duration_ms,
            Phase::Vote => self.vote_duration_ms,
            Phase::Results => self.results_duration_ms,
            Phase::Lobby | Phase::CategorySelect | Phase::Ended => return None,
        };
        (millis > 0).then(|| Duration::from_millis(millis))
    }
}

/// A participating team (or the host, who never plays).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// Identity of the team.
    pub id: TeamId,
    /// Display name, unique within the session (case-insensitive).
    pub name: String,
    /// Host teams never answer, vote or count toward completion.
    pub is_host: bool,
    /// Cumulative score, only changed by the scoring engine.
    pub score: i64,
    /// When the team joined.
    pub joined_at: OffsetDateTime,
    /// Last accepted submission.
    pub last_active_at: Option<OffsetDateTime>,
}

/// Teams answering the same prompt and voting among themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Stable identifier of the group.
    pub id: Uuid,
    /// Prompt shown to the members.
    pub prompt: String,
    /// Members in insertion order, without duplicates.
    pub team_ids: Vec<TeamId>,
}

impl Group {
    /// Whether `team_id` belongs to the group.
    pub fn contains(&self, team_id: &str) -> bool {
        self.team_ids.iter().any(|id| id == team_id)
    }
}

/// One answer+vote cycle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Round {
    /// Display prompt when the whole round shares one.
    pub prompt: Option<String>,
    /// Groups of the round; late joiners may append new ones.
    pub groups: Vec<Group>,
}

impl Round {
    /// Group with the given identifier.
    pub fn group(&self, group_id: Uuid) -> Option<&Group> {
        self.groups.iter().find(|group| group.id == group_id)
    }
}

/// Answer written by a team for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Identifier referenced by votes; kept stable across re-submissions.
    pub id: Uuid,
    /// Author.
    pub team_id: TeamId,
    /// Round the answer belongs to.
    pub round_index: u32,
    /// Group of the author in that round.
    pub group_id: Uuid,
    /// Moderated text.
    pub text: String,
    /// First submission time.
    pub created_at: OffsetDateTime,
    /// Whether the moderation step masked part of the text.
    pub masked: bool,
}

/// Vote cast by a team inside its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    /// Voting team.
    pub voter_id: TeamId,
    /// Round of the vote.
    pub round_index: u32,
    /// Group being voted on.
    pub group_id: Uuid,
    /// Chosen answer.
    pub answer_id: Uuid,
    /// Time of the latest choice.
    pub created_at: OffsetDateTime,
}

/// Marker that a group's tally has been applied to the scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoredGroup {
    /// Round of the group.
    pub round_index: u32,
    /// Scored group.
    pub group_id: Uuid,
}

/// The whole session aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Primary key.
    pub id: Uuid,
    /// Join code shown to teams.
    pub code: String,
    /// Identity of the host.
    pub host_id: TeamId,
    /// Optional venue label.
    pub venue_name: Option<String>,
    /// Prompt library the deck was built from.
    pub prompt_library_id: Option<String>,
    /// Current phase; only changed through the transition helpers.
    pub phase: Phase,
    /// Current round, never decreases.
    pub round_index: u32,
    /// Rounds created so far.
    pub rounds: Vec<Round>,
    /// Group currently voting.
    pub active_group_index: Option<usize>,
    /// Session tunables.
    pub settings: SessionSettings,
    /// Teams keyed by identity, in join order.
    pub teams: IndexMap<TeamId, Team>,
    /// Answers keyed by `(team, round)`.
    pub answers: IndexMap<AnswerKey, Answer>,
    /// Votes keyed by `(voter, round, group)`.
    pub votes: IndexMap<VoteKey, Vote>,
    /// Identities that may not join again.
    pub banned: Vec<TeamId>,
    /// Shuffled prompt deck and its cursor.
    pub prompt_deck: PromptDeck,
    /// Groups whose scores have already been awarded.
    pub scored_groups: Vec<ScoredGroup>,
    /// Set while the session is paused.
    pub paused_at: Option<OffsetDateTime>,
    /// Deadline budget frozen by the pause.
    pub paused_remaining_ms: Option<u64>,
    /// Total time spent paused.
    pub total_paused_ms: u64,
    /// Advisory deadline of the current phase.
    pub phase_deadline: Option<OffsetDateTime>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last committed change.
    pub updated_at: OffsetDateTime,
    /// When the session reached `ended`.
    pub ended_at: Option<OffsetDateTime>,
}

/// Everything needed to open a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Join code.
    pub code: String,
    /// Identity of the host.
    pub host_id: TeamId,
    /// Display name of the host team.
    pub host_name: String,
    /// Optional venue label.
    pub venue_name: Option<String>,
    /// Prompt library the deck was built from.
    pub prompt_library_id: Option<String>,
    /// Session tunables.
    pub settings: SessionSettings,
    /// Freshly shuffled deck.
    pub prompt_deck: PromptDeck,
}

impl GameSession {
    /// Open a session in the lobby with the host as its only team.
    pub fn new(new: NewSession, now: OffsetDateTime) -> Self {
        let NewSession {
            code,
            host_id,
            host_name,
            venue_name,
            prompt_library_id,
            settings,
            prompt_deck,
        } = new;

        let mut teams = IndexMap::new();
        teams.insert(
            host_id.clone(),
            Team {
                id: host_id.clone(),
                name: host_name,
                is_host: true,
                score: 0,
                joined_at: now,
                last_active_at: None,
            },
        );

        Self {
            id: Uuid::new_v4(),
            code,
            host_id,
            venue_name,
            prompt_library_id,
            phase: Phase::Lobby,
            round_index: 0,
            rounds: Vec::new(),
            active_group_index: None,
            settings,
            teams,
            answers: IndexMap::new(),
            votes: IndexMap::new(),
            banned: Vec::new(),
            prompt_deck,
            scored_groups: Vec::new(),
            paused_at: None,
            paused_remaining_ms: None,
            total_paused_ms: 0,
            phase_deadline: None,
            created_at: now,
            updated_at: now,
            ended_at: None,
        }
    }

    /// Non-host teams in join order.
    pub fn players(&self) -> impl Iterator<Item = &Team> {
        self.teams.values().filter(|team| !team.is_host)
    }

    /// Number of non-host teams.
    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    /// Whether `team_id` is a known non-host team.
    pub fn is_player(&self, team_id: &str) -> bool {
        self.teams.get(team_id).is_some_and(|team| !team.is_host)
    }

    /// Round at `round_index`, if it was created.
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.get(self.round_index as usize)
    }

    /// Group currently voting.
    pub fn active_group(&self) -> Option<&Group> {
        let index = self.active_group_index?;
        self.current_round()?.groups.get(index)
    }

    /// Answer of a team for a round.
    pub fn answer_for(&self, team_id: &str, round_index: u32) -> Option<&Answer> {
        self.answers.get(&(team_id.to_owned(), round_index))
    }

    /// Answer by identifier.
    pub fn answer_by_id(&self, answer_id: Uuid) -> Option<&Answer> {
        self.answers.values().find(|answer| answer.id == answer_id)
    }

    /// Answers of one group in one round, in submission order.
    pub fn group_answers(&self, round_index: u32, group_id: Uuid) -> impl Iterator<Item = &Answer> {
        self.answers
            .values()
            .filter(move |answer| answer.round_index == round_index && answer.group_id == group_id)
    }

    /// Votes of one group in one round.
    pub fn group_votes(&self, round_index: u32, group_id: Uuid) -> impl Iterator<Item = &Vote> {
        self.votes
            .values()
            .filter(move |vote| vote.round_index == round_index && vote.group_id == group_id)
    }

    /// Whether the group's tally was already applied.
    pub fn is_group_scored(&self, round_index: u32, group_id: Uuid) -> bool {
        self.scored_groups
            .iter()
            .any(|scored| scored.round_index == round_index && scored.group_id == group_id)
    }

    /// Whether the session is paused.
    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Whether the current phase deadline is set and has passed.
    pub fn deadline_passed(&self, now: OffsetDateTime) -> bool {
        self.phase_deadline.is_some_and(|deadline| now > deadline)
    }

    /// Record activity for a team.
    pub fn touch_team(&mut self, team_id: &str, now: OffsetDateTime) {
        if let Some(team) = self.teams.get_mut(team_id) {
            team.last_active_at = Some(now);
        }
    }
}
