use serde::Serialize;

use super::outcome::{derive_outcome, Outcome};
use crate::ledger::{GameView, Plaintext, ValueHandle, HAND_SIZE};
use crate::reveal::RevealCache;

/// One played round, recorded by handle in play order. Plaintexts are looked
/// up from the cache when the round is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundSummary {
    pub round: u8,
    pub player_card: ValueHandle,
    pub system_card: ValueHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundResult {
    pub round: u8,
    pub player_card: Option<Plaintext>,
    pub system_card: Option<Plaintext>,
    pub outcome: Outcome,
}

impl RoundSummary {
    pub fn resolve(&self, cache: &RevealCache) -> RoundResult {
        let player_card = cache.get(&self.player_card);
        let system_card = cache.get(&self.system_card);
        RoundResult {
            round: self.round,
            player_card,
            system_card,
            outcome: derive_outcome(player_card, system_card),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub slot: u8,
    pub handle: ValueHandle,
    pub value: Option<Plaintext>,
    pub used: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemCardView {
    pub round: u8,
    pub revealed: bool,
    pub value: Option<Plaintext>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scoreboard {
    pub player: Option<Plaintext>,
    pub system: Option<Plaintext>,
    pub rounds_played: u8,
    pub remaining_rounds: u8,
    pub active: bool,
}

pub(crate) fn hand(view: &GameView, cache: &RevealCache) -> Vec<CardView> {
    if !view.has_game() {
        return Vec::new();
    }
    (0..HAND_SIZE)
        .map(|slot| CardView {
            slot: slot as u8,
            handle: view.player_hand[slot],
            value: cache.get(&view.player_hand[slot]),
            used: view.player_used[slot],
        })
        .collect()
}

pub(crate) fn system_cards(view: &GameView, cache: &RevealCache) -> Vec<SystemCardView> {
    if !view.has_game() {
        return Vec::new();
    }
    (0..HAND_SIZE)
        .map(|round| {
            let revealed = view.system_revealed[round];
            SystemCardView {
                round: round as u8 + 1,
                revealed,
                value: revealed
                    .then(|| cache.get(&view.system_hand[round]))
                    .flatten(),
            }
        })
        .collect()
}

pub(crate) fn scoreboard(view: &GameView, cache: &RevealCache) -> Scoreboard {
    let remaining_rounds = if view.has_game() {
        (HAND_SIZE as u8).saturating_sub(view.rounds_played)
    } else {
        0
    };
    Scoreboard {
        player: cache.get(&view.player_score),
        system: cache.get(&view.system_score),
        rounds_played: view.rounds_played,
        remaining_rounds,
        active: view.active,
    }
}

/// Final result of a finished game, from cached plaintexts only.
pub(crate) fn match_outcome(view: &GameView, cache: &RevealCache) -> Outcome {
    if !view.has_game() || view.active {
        return Outcome::Pending;
    }
    derive_outcome(cache.get(&view.player_score), cache.get(&view.system_score))
}

/// Every handle the participant may reveal in the current view.
pub(crate) fn reveal_candidates(view: &GameView, history: &[RoundSummary]) -> Vec<ValueHandle> {
    let mut candidates = Vec::with_capacity(HAND_SIZE * 2 + 3 + history.len() * 2);
    if view.has_game() {
        candidates.extend_from_slice(&view.player_hand);
        candidates.extend(
            view.system_hand
                .iter()
                .zip(view.system_revealed.iter())
                .filter(|(_, revealed)| **revealed)
                .map(|(handle, _)| *handle),
        );
        candidates.extend([view.player_score, view.system_score, view.last_system_card]);
    }
    for summary in history {
        candidates.extend([summary.player_card, summary.system_card]);
    }
    candidates
}
