use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{ClientError, LedgerCall, TxReceipt};
use super::contract::CardDuelLedger;
use super::types::{Address, BlockNumber, TxHash};

const LOG_TARGET: &str = "card_duel::ledger::worker";

/// A transaction waiting for the worker to include it.
pub struct SubmittedCall {
    pub hash: TxHash,
    pub caller: Address,
    pub call: LedgerCall,
    pub reply: oneshot::Sender<Result<TxReceipt, ClientError>>,
}

/// Drains submitted calls and applies them to the ledger one at a time, in
/// arrival order. Each applied call becomes one block.
pub struct LedgerWorker {
    ledger: Arc<CardDuelLedger>,
    submissions: mpsc::Receiver<SubmittedCall>,
    next_block: BlockNumber,
}

impl LedgerWorker {
    pub fn new(ledger: Arc<CardDuelLedger>, submissions: mpsc::Receiver<SubmittedCall>) -> Self {
        Self {
            ledger,
            submissions,
            next_block: 1,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), WorkerError> {
        info!(target: LOG_TARGET, contract = %self.ledger.address(), "ledger worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: LOG_TARGET, "ledger worker cancelled");
                    return Ok(());
                }
                submitted = self.submissions.recv() => {
                    match submitted {
                        Some(submitted) => self.handle_call(submitted)?,
                        None => {
                            info!(target: LOG_TARGET, "submission channel closed; worker exiting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    fn handle_call(&mut self, submitted: SubmittedCall) -> Result<(), WorkerError> {
        let SubmittedCall {
            hash,
            caller,
            call,
            reply,
        } = submitted;

        let applied = match call {
            LedgerCall::StartGame => self.ledger.start_game(caller),
            LedgerCall::PlayCard { index } => self.ledger.play_card(caller, index),
        };

        let outcome = match applied {
            Ok(events) => {
                let block_number = self.next_block;
                self.next_block += 1;
                let consistent = self
                    .ledger
                    .record(&caller)
                    .map(|record| record.validate_invariants().is_ok())
                    .unwrap_or(true);
                if !consistent {
                    error!(
                        target: LOG_TARGET,
                        tx = %hash,
                        player = %caller,
                        "committed record violates ledger invariants"
                    );
                    return Err(WorkerError::Invariant(hash));
                }
                info!(
                    target: LOG_TARGET,
                    tx = %hash,
                    block = block_number,
                    player = %caller,
                    ?call,
                    "transaction final"
                );
                for event in &events {
                    debug!(
                        target: LOG_TARGET,
                        tx = %hash,
                        event = event.name(),
                        player = %event.player(),
                        "event emitted"
                    );
                }
                Ok(TxReceipt {
                    tx_hash: hash,
                    block_number,
                    events,
                })
            }
            Err(err) => {
                warn!(target: LOG_TARGET, tx = %hash, player = %caller, ?call, %err, "transaction reverted");
                Err(ClientError::Reverted(err))
            }
        };

        // The submitter may have stopped waiting; the call is applied regardless.
        let _ = reply.send(outcome);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("transaction {0} left an inconsistent record")]
    Invariant(TxHash),
}
