use serde::{Deserialize, Serialize};

use super::errors::StateError;
use super::types::{ValueHandle, HAND_SIZE};

/// Five card handles with an index-aligned status flag per slot.
///
/// The flag means `used` on the player's hand and `revealed` on the system's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    pub cards: [ValueHandle; HAND_SIZE],
    pub flags: [bool; HAND_SIZE],
}

impl Hand {
    pub fn new(cards: [ValueHandle; HAND_SIZE]) -> Self {
        Self {
            cards,
            flags: [false; HAND_SIZE],
        }
    }

    pub fn empty() -> Self {
        Self::new([ValueHandle::SENTINEL; HAND_SIZE])
    }

    pub fn flagged_count(&self) -> usize {
        self.flags.iter().filter(|flag| **flag).count()
    }
}

impl Default for Hand {
    fn default() -> Self {
        Self::empty()
    }
}

/// Authoritative per-participant game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub player_hand: Hand,
    pub system_hand: Hand,
    pub rounds_played: u8,
    pub player_score: ValueHandle,
    pub system_score: ValueHandle,
    pub active: bool,
    pub last_system_card: ValueHandle,
}

impl GameRecord {
    /// Fresh record for a newly dealt game.
    pub fn dealt(player: [ValueHandle; HAND_SIZE], system: [ValueHandle; HAND_SIZE]) -> Self {
        Self {
            player_hand: Hand::new(player),
            system_hand: Hand::new(system),
            rounds_played: 0,
            player_score: ValueHandle::SENTINEL,
            system_score: ValueHandle::SENTINEL,
            active: true,
            last_system_card: ValueHandle::SENTINEL,
        }
    }

    pub fn remaining_rounds(&self) -> u8 {
        (HAND_SIZE as u8).saturating_sub(self.rounds_played)
    }

    pub fn is_finished(&self) -> bool {
        !self.active && self.rounds_played as usize == HAND_SIZE
    }

    /// Checks the structural invariants a committed record must satisfy.
    pub fn validate_invariants(&self) -> Result<(), StateError> {
        let rounds = self.rounds_played as usize;
        if rounds > HAND_SIZE {
            return Err(StateError::InvariantViolation("rounds played exceeds hand size"));
        }
        if self.player_hand.flagged_count() != rounds {
            return Err(StateError::InvariantViolation(
                "rounds played differs from used card count",
            ));
        }
        // System cards are revealed strictly in slot order, one per round.
        let revealed_prefix = self.system_hand.flags.iter().take(rounds).all(|f| *f);
        let hidden_suffix = self.system_hand.flags.iter().skip(rounds).all(|f| !*f);
        if !revealed_prefix || !hidden_suffix {
            return Err(StateError::InvariantViolation(
                "system reveals are not a prefix of length rounds played",
            ));
        }
        if self.active != (rounds < HAND_SIZE) {
            return Err(StateError::InvariantViolation(
                "active flag inconsistent with rounds played",
            ));
        }
        Ok(())
    }
}

/// Flattened result of the `getGame` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameView {
    pub player_hand: [ValueHandle; HAND_SIZE],
    pub player_used: [bool; HAND_SIZE],
    pub system_hand: [ValueHandle; HAND_SIZE],
    pub system_revealed: [bool; HAND_SIZE],
    pub rounds_played: u8,
    pub player_score: ValueHandle,
    pub system_score: ValueHandle,
    pub active: bool,
    pub last_system_card: ValueHandle,
}

impl GameView {
    /// View returned for an identity that never started a game.
    pub fn empty() -> Self {
        Self {
            player_hand: [ValueHandle::SENTINEL; HAND_SIZE],
            player_used: [false; HAND_SIZE],
            system_hand: [ValueHandle::SENTINEL; HAND_SIZE],
            system_revealed: [false; HAND_SIZE],
            rounds_played: 0,
            player_score: ValueHandle::SENTINEL,
            system_score: ValueHandle::SENTINEL,
            active: false,
            last_system_card: ValueHandle::SENTINEL,
        }
    }

    pub fn has_game(&self) -> bool {
        self.player_hand.iter().any(|handle| !handle.is_sentinel())
    }
}

impl Default for GameView {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<&GameRecord> for GameView {
    fn from(record: &GameRecord) -> Self {
        Self {
            player_hand: record.player_hand.cards,
            player_used: record.player_hand.flags,
            system_hand: record.system_hand.cards,
            system_revealed: record.system_hand.flags,
            rounds_played: record.rounds_played,
            player_score: record.player_score,
            system_score: record.system_score,
            active: record.active,
            last_system_card: record.last_system_card,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serde::assert_round_trip_eq;

    fn handles(seed: u8) -> [ValueHandle; HAND_SIZE] {
        std::array::from_fn(|i| ValueHandle::new([seed + i as u8; 32]))
    }

    #[test]
    fn dealt_record_satisfies_invariants() {
        let record = GameRecord::dealt(handles(1), handles(10));
        assert!(record.validate_invariants().is_ok());
        assert_eq!(record.remaining_rounds(), 5);
        assert!(record.player_score.is_sentinel());
        assert!(record.system_score.is_sentinel());
    }

    #[test]
    fn out_of_order_reveal_is_an_invariant_violation() {
        let mut record = GameRecord::dealt(handles(1), handles(10));
        record.player_hand.flags[3] = true;
        record.system_hand.flags[2] = true;
        record.rounds_played = 1;
        assert_eq!(
            record.validate_invariants(),
            Err(StateError::InvariantViolation(
                "system reveals are not a prefix of length rounds played"
            ))
        );
    }

    #[test]
    fn active_flag_must_track_rounds() {
        let mut record = GameRecord::dealt(handles(1), handles(10));
        record.player_hand.flags = [true; HAND_SIZE];
        record.system_hand.flags = [true; HAND_SIZE];
        record.rounds_played = HAND_SIZE as u8;
        assert!(record.validate_invariants().is_err());
        record.active = false;
        assert!(record.validate_invariants().is_ok());
        assert!(record.is_finished());
    }

    #[test]
    fn empty_view_has_no_game() {
        let view = GameView::empty();
        assert!(!view.has_game());
        assert!(!view.active);
        let dealt = GameView::from(&GameRecord::dealt(handles(1), handles(10)));
        assert!(dealt.has_game());
        assert_round_trip_eq(&dealt);
    }
}
