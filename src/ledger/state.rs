use dashmap::DashMap;

use super::record::GameRecord;
use super::types::Address;

// ---- Ledger state --------------------------------------------------------------------------

/// Keyed store holding the one live record per participant.
///
/// Writers go through [`LedgerState::update`], which holds the shard lock for
/// that key for the whole closure, so each record has a single writer at a time.
#[derive(Default)]
pub struct LedgerState {
    records: DashMap<Address, GameRecord>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, player: &Address) -> Option<GameRecord> {
        self.records.get(player).map(|record| *record)
    }

    /// Replace the record for `player` wholesale, returning the previous one.
    pub fn replace(&self, player: Address, record: GameRecord) -> Option<GameRecord> {
        self.records.insert(player, record)
    }

    /// Run `f` against a working copy of the player's record and commit the
    /// copy only if `f` succeeds.
    pub fn update<T, E, F>(&self, player: &Address, missing: E, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut GameRecord) -> Result<T, E>,
    {
        let mut entry = self.records.get_mut(player).ok_or(missing)?;
        let mut working = *entry;
        let output = f(&mut working)?;
        *entry = working;
        Ok(output)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::types::{ValueHandle, HAND_SIZE};

    fn record() -> GameRecord {
        GameRecord::dealt(
            [ValueHandle::new([1u8; 32]); HAND_SIZE],
            [ValueHandle::new([2u8; 32]); HAND_SIZE],
        )
    }

    #[test]
    fn failed_update_leaves_record_untouched() {
        let state = LedgerState::new();
        let player = Address::new([9u8; 20]);
        state.replace(player, record());

        let result: Result<(), &str> = state.update(&player, "missing", |working| {
            working.rounds_played = 3;
            Err("rejected")
        });

        assert_eq!(result, Err("rejected"));
        assert_eq!(state.record(&player).unwrap().rounds_played, 0);
    }

    #[test]
    fn successful_update_commits_working_copy() {
        let state = LedgerState::new();
        let player = Address::new([9u8; 20]);
        state.replace(player, record());

        state
            .update(&player, "missing", |working| {
                working.active = false;
                Ok::<_, &str>(())
            })
            .unwrap();

        assert!(!state.record(&player).unwrap().active);
    }

    #[test]
    fn update_without_record_reports_missing() {
        let state = LedgerState::new();
        let result = state.update(&Address::new([1u8; 20]), "missing", |_| Ok(()));
        assert_eq!(result, Err("missing"));
        assert!(state.is_empty());
    }
}
