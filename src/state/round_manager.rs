//! Group assignment and prompt distribution.
//!
//! Every operation is a pure `Round -> Round'` transformation: inputs are borrowed,
//! and the new round together with the advanced deck is returned to the caller,
//! which persists both inside the same transaction.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use thiserror::Error;
use uuid::Uuid;

use crate::state::session::{GameSession, Group, Round, TeamId};

/// Failures while building or extending a round.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoundError {
    /// The session has no prompt to draw from.
    #[error("prompt pool is empty")]
    EmptyPromptPool,
}

/// Shuffled prompt deck with its cursor, persisted alongside the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromptDeck {
    /// Every prompt the deck may contain.
    pub pool: Vec<String>,
    /// Current shuffled order.
    pub cards: Vec<String>,
    /// Index of the next card to draw.
    pub cursor: usize,
}

impl PromptDeck {
    /// Build a freshly shuffled deck from `pool`.
    pub fn new<R: Rng + ?Sized>(pool: Vec<String>, rng: &mut R) -> Self {
        let mut cards = pool.clone();
        cards.shuffle(rng);
        Self {
            pool,
            cards,
            cursor: 0,
        }
    }

    /// Deck whose cards are drawn in pool order until the first reshuffle.
    pub fn from_cards(pool: Vec<String>) -> Self {
        Self {
            cards: pool.clone(),
            pool,
            cursor: 0,
        }
    }

    /// Cards left before the next reshuffle.
    pub fn remaining(&self) -> usize {
        self.cards.len().saturating_sub(self.cursor)
    }

    /// Draw the next card that is not in `used`.
    ///
    /// The deck is reshuffled from the full pool whenever it runs out. Collisions are
    /// re-drawn at most twice the pool size; once that bound is reached the colliding
    /// card is accepted, which only happens when the pool holds fewer distinct prompts
    /// than the round needs.
    pub fn draw<R: Rng + ?Sized>(
        &mut self,
        used: &HashSet<String>,
        rng: &mut R,
    ) -> Result<String, RoundError> {
        if self.pool.is_empty() {
            return Err(RoundError::EmptyPromptPool);
        }

        let budget = self.pool.len() * 2;
        let mut collisions = 0;
        loop {
            if self.cursor >= self.cards.len() {
                self.cards = self.pool.clone();
                self.cards.shuffle(rng);
                self.cursor = 0;
            }
            let card = self.cards[self.cursor].clone();
            self.cursor += 1;

            if !used.contains(&card) || collisions >= budget {
                return Ok(card);
            }
            collisions += 1;
        }
    }
}

/// Result of placing a team into an existing round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Round including the team.
    pub round: Round,
    /// Deck after any draw.
    pub deck: PromptDeck,
    /// Group the team ended up in.
    pub group_index: usize,
    /// Whether a new group had to be opened.
    pub created: bool,
}

/// Shuffle `team_ids`, split them into groups of `group_size` and give each group a prompt.
pub fn create_round<R: Rng + ?Sized>(
    team_ids: &[TeamId],
    deck: &PromptDeck,
    group_size: usize,
    rng: &mut R,
) -> Result<(Round, PromptDeck), RoundError> {
    let mut deck = deck.clone();
    let mut shuffled = team_ids.to_vec();
    shuffled.shuffle(rng);

    let mut used = HashSet::new();
    let mut groups = Vec::with_capacity(shuffled.len().div_ceil(group_size.max(1)));
    for chunk in shuffled.chunks(group_size.max(1)) {
        let prompt = deck.draw(&used, rng)?;
        used.insert(prompt.clone());
        groups.push(Group {
            id: Uuid::new_v4(),
            prompt,
            team_ids: chunk.to_vec(),
        });
    }

    let prompt = match groups.as_slice() {
        [only] => Some(only.prompt.clone()),
        _ => None,
    };
    Ok((Round { prompt, groups }, deck))
}

/// Place a late joiner into `round`.
///
/// The team goes to the smallest group with room left, or to a new group with a
/// prompt not yet used in this round when every group is full.
pub fn add_team_to_round<R: Rng + ?Sized>(
    round: &Round,
    team_id: &str,
    deck: &PromptDeck,
    group_size: usize,
    rng: &mut R,
) -> Result<Placement, RoundError> {
    if let Some((group_index, _)) = find_group_for_team(round, team_id) {
        return Ok(Placement {
            round: round.clone(),
            deck: deck.clone(),
            group_index,
            created: false,
        });
    }

    let mut round = round.clone();
    let mut deck = deck.clone();
    let smallest = round
        .groups
        .iter()
        .enumerate()
        .filter(|(_, group)| group.team_ids.len() < group_size.max(1))
        .min_by_key(|(_, group)| group.team_ids.len())
        .map(|(index, _)| index);

    if let Some(group_index) = smallest {
        round.groups[group_index].team_ids.push(team_id.to_owned());
        return Ok(Placement {
            round,
            deck,
            group_index,
            created: false,
        });
    }

    let used = round
        .groups
        .iter()
        .map(|group| group.prompt.clone())
        .collect::<HashSet<_>>();
    let prompt = deck.draw(&used, rng)?;
    round.groups.push(Group {
        id: Uuid::new_v4(),
        prompt,
        team_ids: vec![team_id.to_owned()],
    });
    let group_index = round.groups.len() - 1;
    if round.groups.len() > 1 {
        round.prompt = None;
    }

    Ok(Placement {
        round,
        deck,
        group_index,
        created: true,
    })
}

/// Group of `team_id` within `round`.
pub fn find_group_for_team<'a>(round: &'a Round, team_id: &str) -> Option<(usize, &'a Group)> {
    round
        .groups
        .iter()
        .enumerate()
        .find(|(_, group)| group.contains(team_id))
}

/// Every non-host member of `group` has answered in `round_index`.
pub fn is_group_answer_complete(session: &GameSession, round_index: u32, group: &Group) -> bool {
    group
        .team_ids
        .iter()
        .filter(|id| session.is_player(id))
        .all(|id| session.answer_for(id, round_index).is_some())
}

/// Every group of the round at `round_index` is answer complete.
pub fn is_round_answer_complete(session: &GameSession, round_index: u32) -> bool {
    session
        .rounds
        .get(round_index as usize)
        .is_some_and(|round| {
            round
                .groups
                .iter()
                .all(|group| is_group_answer_complete(session, round_index, group))
        })
}
