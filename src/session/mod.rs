//! Participant-facing game session. Drives the ledger through the
//! transaction client, keeps the local view and round history, and feeds the
//! reveal pipeline with whatever the participant is allowed to see.

mod error;
mod outcome;
mod status;
mod view;


use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::ledger::{Address, GameView, LedgerCall, LedgerClient, ValueHandle};
use crate::reveal::{RevealDispatcher, RevealReport, WalletSigner};

pub use error::SessionError;
pub use outcome::{derive_outcome, Outcome};
pub use status::{
    round_resolved_message, DecryptionStatus, SessionStatus, MSG_CREATING_GAME, MSG_GAME_READY,
    MSG_SCORES_PENDING,
};
pub use view::{CardView, RoundResult, RoundSummary, Scoreboard, SystemCardView};

const LOG_TARGET: &str = "card_duel::session";

#[derive(Default)]
struct SessionInner {
    identity: Option<Address>,
    signer: Option<Arc<dyn WalletSigner>>,
    view: GameView,
    history: Vec<RoundSummary>,
    status: SessionStatus,
}

pub struct GameSession {
    config: SessionConfig,
    ledger: Arc<dyn LedgerClient>,
    dispatcher: Arc<RevealDispatcher>,
    inner: Mutex<SessionInner>,
    /// Held for the duration of a mutating action.
    action_gate: tokio::sync::Mutex<()>,
}

impl GameSession {
    pub fn new(
        config: SessionConfig,
        ledger: Arc<dyn LedgerClient>,
        dispatcher: Arc<RevealDispatcher>,
    ) -> Self {
        Self {
            config,
            ledger,
            dispatcher,
            inner: Mutex::new(SessionInner::default()),
            action_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Switch to `identity`. All per-identity state is dropped.
    pub fn connect(&self, identity: Address, signer: Option<Arc<dyn WalletSigner>>) {
        let mut inner = self.inner.lock();
        if inner.identity == Some(identity) {
            inner.signer = signer;
            return;
        }
        info!(target: LOG_TARGET, player = %identity, "participant connected");
        *inner = SessionInner {
            identity: Some(identity),
            signer,
            ..SessionInner::default()
        };
        self.dispatcher.cache().reset();
    }

    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if let Some(identity) = inner.identity {
            info!(target: LOG_TARGET, player = %identity, "participant disconnected");
        }
        *inner = SessionInner::default();
        self.dispatcher.cache().reset();
    }

    pub fn identity(&self) -> Option<Address> {
        self.inner.lock().identity
    }

    /// Deal a new game for the connected participant, forfeiting any game in
    /// progress.
    pub async fn start_game(&self) -> Result<(), SessionError> {
        let result = match self.action_gate.try_lock() {
            Ok(_gate) => self.run_start().await,
            Err(_) => Err(SessionError::ActionInProgress),
        };
        self.record_failure(&result);
        result
    }

    /// Play the card in hand slot `index` against the next system card.
    pub async fn play_card(&self, index: u8) -> Result<(), SessionError> {
        let result = match self.action_gate.try_lock() {
            Ok(_gate) => self.run_play(index).await,
            Err(_) => Err(SessionError::ActionInProgress),
        };
        self.record_failure(&result);
        result
    }

    /// Re-read the ledger record and reveal anything newly visible. Reveal
    /// failures only affect the decryption indicator.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let result = self.run_refresh().await;
        self.record_failure(&result);
        result
    }

    /// Run one reveal pass over the current view and report the outcome.
    pub async fn refresh_reveals(&self) -> Result<RevealReport, SessionError> {
        let (candidates, signer, epoch) = {
            let mut inner = self.inner.lock();
            inner.status.decryption = DecryptionStatus::Decrypting;
            (
                view::reveal_candidates(&inner.view, &inner.history),
                inner.signer.clone(),
                self.dispatcher.cache().epoch(),
            )
        };

        let result = self
            .dispatcher
            .reveal(candidates, signer.as_deref())
            .await
            .map_err(SessionError::from);

        let mut inner = self.inner.lock();
        // A reset in between means this pass belongs to a state that is gone.
        if self.dispatcher.cache().epoch() == epoch {
            inner.status.decryption = match &result {
                Ok(_) => DecryptionStatus::Idle,
                Err(err) => DecryptionStatus::Failed(err.status_message()),
            };
        }
        result
    }

    pub fn game_view(&self) -> GameView {
        self.inner.lock().view
    }

    pub fn hand(&self) -> Vec<CardView> {
        view::hand(&self.inner.lock().view, self.dispatcher.cache())
    }

    pub fn system_cards(&self) -> Vec<SystemCardView> {
        view::system_cards(&self.inner.lock().view, self.dispatcher.cache())
    }

    pub fn scoreboard(&self) -> Scoreboard {
        view::scoreboard(&self.inner.lock().view, self.dispatcher.cache())
    }

    pub fn history(&self) -> Vec<RoundSummary> {
        self.inner.lock().history.clone()
    }

    pub fn round_results(&self) -> Vec<RoundResult> {
        let cache = self.dispatcher.cache();
        self.inner
            .lock()
            .history
            .iter()
            .map(|summary| summary.resolve(cache))
            .collect()
    }

    /// Outcome of the finished game, `Pending` while the game runs or while
    /// the final scores are not revealed.
    pub fn outcome(&self) -> Outcome {
        view::match_outcome(&self.inner.lock().view, self.dispatcher.cache())
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status.clone()
    }

    fn require_identity(&self) -> Result<Address, SessionError> {
        self.config.require_contract()?;
        self.inner
            .lock()
            .identity
            .ok_or(SessionError::IdentityUnavailable)
    }

    async fn run_start(&self) -> Result<(), SessionError> {
        let identity = self.require_identity()?;
        if matches!(self.ledger.has_active_game(identity).await, Ok(true)) {
            warn!(target: LOG_TARGET, player = %identity, "forfeiting game in progress");
        }
        self.inner.lock().status.set_message(MSG_CREATING_GAME);

        let pending = self.ledger.submit(identity, LedgerCall::StartGame).await?;
        let receipt = pending.wait().await?;

        // The previous game is gone from the ledger even if the re-read fails.
        {
            let mut inner = self.inner.lock();
            inner.view = GameView::empty();
            inner.history.clear();
            self.dispatcher.cache().reset();
        }
        let view = self.fetch_view(identity).await?;
        {
            let mut inner = self.inner.lock();
            inner.view = view;
            inner.status.set_message(MSG_GAME_READY);
        }
        info!(
            target: LOG_TARGET,
            player = %identity,
            tx = %receipt.tx_hash,
            block = receipt.block_number,
            "game started"
        );

        self.reveal_quietly().await;
        Ok(())
    }

    async fn run_play(&self, index: u8) -> Result<(), SessionError> {
        let identity = self.require_identity()?;
        let player_card = {
            let inner = self.inner.lock();
            if !inner.view.active {
                return Err(SessionError::GameNotStarted);
            }
            inner
                .view
                .player_hand
                .get(index as usize)
                .copied()
                .unwrap_or(ValueHandle::SENTINEL)
        };

        let pending = self
            .ledger
            .submit(identity, LedgerCall::PlayCard { index })
            .await?;
        let receipt = pending.wait().await?;
        let view = self.fetch_view(identity).await?;

        let summary = RoundSummary {
            round: view.rounds_played,
            player_card,
            system_card: view.last_system_card,
        };
        {
            let mut inner = self.inner.lock();
            inner.view = view;
            inner.history.push(summary);
            inner.status.set_message(round_resolved_message(summary.round));
        }
        info!(
            target: LOG_TARGET,
            player = %identity,
            round = summary.round,
            index,
            tx = %receipt.tx_hash,
            "round played"
        );

        self.reveal_quietly().await;
        if !view.active {
            self.announce_outcome();
        }
        Ok(())
    }

    async fn run_refresh(&self) -> Result<(), SessionError> {
        let identity = self.require_identity()?;
        let view = self.fetch_view(identity).await?;
        let finished = view.has_game() && !view.active;
        self.inner.lock().view = view;
        self.reveal_quietly().await;
        if finished {
            self.announce_outcome();
        }
        Ok(())
    }

    async fn fetch_view(&self, identity: Address) -> Result<GameView, SessionError> {
        self.ledger
            .get_game(identity)
            .await
            .map_err(|err| SessionError::StateUnavailable(err.to_string()))
    }

    async fn reveal_quietly(&self) {
        match self.refresh_reveals().await {
            Ok(report) if report.is_noop() => {
                debug!(target: LOG_TARGET, "reveal pass had nothing to do")
            }
            Ok(report) => debug!(
                target: LOG_TARGET,
                resolved = report.resolved,
                pending = report.unresolved.len(),
                "reveal pass settled"
            ),
            Err(err) => warn!(target: LOG_TARGET, %err, "reveal pass failed; will retry"),
        }
    }

    fn announce_outcome(&self) {
        let outcome = self.outcome();
        let mut inner = self.inner.lock();
        match outcome.match_message() {
            Some(message) => {
                info!(target: LOG_TARGET, ?outcome, "game finished");
                inner.status.set_message(message);
            }
            None => inner.status.set_message(MSG_SCORES_PENDING),
        }
    }

    fn record_failure<T>(&self, result: &Result<T, SessionError>) {
        if let Err(err) = result {
            debug!(target: LOG_TARGET, %err, "action failed");
            self.inner.lock().status.set_error(err);
        }
    }
}
