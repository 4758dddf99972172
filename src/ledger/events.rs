use serde::{Deserialize, Serialize};

use super::types::{Address, ValueHandle, HAND_SIZE};

/// Events emitted by the ledger, mirrored into transaction receipts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    GameStarted {
        player: Address,
        player_hand: [ValueHandle; HAND_SIZE],
    },
    RoundPlayed {
        player: Address,
        player_card: ValueHandle,
        system_card: ValueHandle,
        player_score: ValueHandle,
        system_score: ValueHandle,
        rounds_played: u8,
    },
    GameFinished {
        player: Address,
        player_score: ValueHandle,
        system_score: ValueHandle,
    },
}

impl LedgerEvent {
    pub fn player(&self) -> Address {
        match self {
            LedgerEvent::GameStarted { player, .. }
            | LedgerEvent::RoundPlayed { player, .. }
            | LedgerEvent::GameFinished { player, .. } => *player,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::GameStarted { .. } => "GameStarted",
            LedgerEvent::RoundPlayed { .. } => "RoundPlayed",
            LedgerEvent::GameFinished { .. } => "GameFinished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serde::assert_round_trip_json;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = LedgerEvent::GameFinished {
            player: Address::new([3u8; 20]),
            player_score: ValueHandle::new([4u8; 32]),
            system_score: ValueHandle::SENTINEL,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "game_finished");
        assert_round_trip_json(&event);
        assert_eq!(event.name(), "GameFinished");
    }
}
