use serde::{Deserialize, Serialize};

use crate::ledger::Plaintext;

/// Result of comparing two revealed values, either a round's cards or the
/// final scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// At least one side is not revealed yet.
    Pending,
    PlayerWins,
    SystemWins,
    Draw,
}

impl Outcome {
    pub fn is_decided(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    /// Status line announcing a finished match.
    pub fn match_message(&self) -> Option<&'static str> {
        match self {
            Outcome::Pending => None,
            Outcome::PlayerWins => Some("You win the match!"),
            Outcome::SystemWins => Some("The system wins this time."),
            Outcome::Draw => Some("The game ends in a draw."),
        }
    }
}

pub fn derive_outcome(player: Option<Plaintext>, system: Option<Plaintext>) -> Outcome {
    match (player, system) {
        (Some(player), Some(system)) if player > system => Outcome::PlayerWins,
        (Some(player), Some(system)) if player < system => Outcome::SystemWins,
        (Some(_), Some(_)) => Outcome::Draw,
        _ => Outcome::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_needs_both_sides() {
        assert_eq!(derive_outcome(None, None), Outcome::Pending);
        assert_eq!(derive_outcome(Some(3), None), Outcome::Pending);
        assert_eq!(derive_outcome(None, Some(0)), Outcome::Pending);
        assert_eq!(derive_outcome(Some(3), Some(2)), Outcome::PlayerWins);
        assert_eq!(derive_outcome(Some(2), Some(3)), Outcome::SystemWins);
        assert_eq!(derive_outcome(Some(0), Some(0)), Outcome::Draw);
    }

    #[test]
    fn only_decided_outcomes_have_messages() {
        assert_eq!(Outcome::Pending.match_message(), None);
        assert_eq!(
            Outcome::SystemWins.match_message(),
            Some("The system wins this time.")
        );
    }
}
