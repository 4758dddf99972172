use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info};

use super::coprocessor::Coprocessor;
use super::errors::{InvalidMove, LedgerError};
use super::events::LedgerEvent;
use super::record::{GameRecord, GameView};
use super::state::LedgerState;
use super::types::{Address, HAND_SIZE};

const LOG_TARGET: &str = "card_duel::ledger::contract";
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The card-duel game ledger: owns every participant's record and all rules
/// for mutating it. Card values only ever appear as coprocessor handles.
pub struct CardDuelLedger {
    address: Address,
    state: Arc<LedgerState>,
    coprocessor: Arc<dyn Coprocessor>,
    events: broadcast::Sender<LedgerEvent>,
}

impl CardDuelLedger {
    pub fn new(address: Address, coprocessor: Arc<dyn Coprocessor>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            address,
            state: Arc::new(LedgerState::new()),
            coprocessor,
            events,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn protocol_id(&self) -> u64 {
        self.coprocessor.protocol_id()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn get_game(&self, player: &Address) -> GameView {
        self.state
            .record(player)
            .map(|record| GameView::from(&record))
            .unwrap_or_default()
    }

    pub(crate) fn record(&self, player: &Address) -> Option<GameRecord> {
        self.state.record(player)
    }

    /// Whether `player` has a game with rounds left to play.
    pub fn has_active_game(&self, player: &Address) -> bool {
        self.state
            .record(player)
            .is_some_and(|record| record.active)
    }

    pub fn remaining_rounds(&self, player: &Address) -> u8 {
        self.state
            .record(player)
            .map(|record| record.remaining_rounds())
            .unwrap_or(0)
    }

    /// Deal a fresh game for `caller`, replacing any previous record.
    pub fn start_game(&self, caller: Address) -> Result<Vec<LedgerEvent>, LedgerError> {
        if caller.is_zero() {
            return Err(LedgerError::MissingCaller);
        }

        let deal = self.coprocessor.deal()?;
        for handle in deal.player.iter().chain(deal.system.iter()) {
            self.coprocessor.allow(*handle, self.address);
        }
        for handle in deal.player.iter() {
            self.coprocessor.allow(*handle, caller);
        }

        let record = GameRecord::dealt(deal.player, deal.system);
        let replaced = self.state.replace(caller, record);
        info!(
            target: LOG_TARGET,
            player = %caller,
            replaced_active = replaced.map(|r| r.active).unwrap_or(false),
            "game started"
        );

        let events = vec![LedgerEvent::GameStarted {
            player: caller,
            player_hand: deal.player,
        }];
        self.publish(&events);
        Ok(events)
    }

    /// Play the card in hand slot `index` against the system card for the
    /// current round. Rejections leave the record untouched.
    pub fn play_card(&self, caller: Address, index: u8) -> Result<Vec<LedgerEvent>, LedgerError> {
        if caller.is_zero() {
            return Err(LedgerError::MissingCaller);
        }

        let coprocessor = &self.coprocessor;
        let contract = self.address;
        let events = self.state.update(
            &caller,
            LedgerError::from(InvalidMove::GameNotActive),
            |record| {
                if !record.active {
                    return Err(InvalidMove::GameNotActive.into());
                }
                let slot = index as usize;
                if slot >= HAND_SIZE {
                    return Err(InvalidMove::IndexOutOfRange { index }.into());
                }
                if record.player_hand.flags[slot] {
                    return Err(InvalidMove::CardAlreadyUsed { index }.into());
                }

                let round = record.rounds_played as usize;
                let player_card = record.player_hand.cards[slot];
                let system_card = record.system_hand.cards[round];

                let player_wins = coprocessor.gt(player_card, system_card)?;
                let system_wins = coprocessor.lt(player_card, system_card)?;
                let player_bumped = coprocessor.add_scalar(record.player_score, 1)?;
                let system_bumped = coprocessor.add_scalar(record.system_score, 1)?;
                let player_score =
                    coprocessor.select(player_wins, player_bumped, record.player_score)?;
                let system_score =
                    coprocessor.select(system_wins, system_bumped, record.system_score)?;

                for handle in [player_score, system_score, system_card] {
                    coprocessor.allow(handle, contract);
                    coprocessor.allow(handle, caller);
                }

                record.player_hand.flags[slot] = true;
                record.system_hand.flags[round] = true;
                record.last_system_card = system_card;
                record.player_score = player_score;
                record.system_score = system_score;
                record.rounds_played += 1;
                if record.rounds_played as usize == HAND_SIZE {
                    record.active = false;
                }
                debug_assert!(record.validate_invariants().is_ok());

                let mut events = vec![LedgerEvent::RoundPlayed {
                    player: caller,
                    player_card,
                    system_card,
                    player_score,
                    system_score,
                    rounds_played: record.rounds_played,
                }];
                if !record.active {
                    events.push(LedgerEvent::GameFinished {
                        player: caller,
                        player_score,
                        system_score,
                    });
                }
                Ok(events)
            },
        )?;

        debug!(
            target: LOG_TARGET,
            player = %caller,
            index,
            events = events.len(),
            "card played"
        );
        self.publish(&events);
        Ok(events)
    }

    fn publish(&self, events: &[LedgerEvent]) {
        for event in events {
            // No subscribers is fine; receipts carry the same events.
            let _ = self.events.send(event.clone());
        }
    }
}
