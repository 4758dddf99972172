use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::contract::CardDuelLedger;
use super::errors::LedgerError;
use super::events::LedgerEvent;
use super::record::GameView;
use super::types::{Address, BlockNumber, TxHash};
use super::worker::{LedgerWorker, SubmittedCall, WorkerError};
use crate::signing::{Signable, TranscriptBuilder};
use crate::tokio_tools::spawn_named_task;

const LOG_TARGET: &str = "card_duel::ledger::client";
pub const DEFAULT_SUBMIT_CAPACITY: usize = 64;

/// Mutating entry points of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum LedgerCall {
    StartGame,
    PlayCard { index: u8 },
}

impl Signable for LedgerCall {
    fn domain_kind(&self) -> &'static str {
        "ledger/call_v1"
    }

    fn write_transcript(&self, builder: &mut TranscriptBuilder) {
        match self {
            LedgerCall::StartGame => builder.append_u8(0),
            LedgerCall::PlayCard { index } => {
                builder.append_u8(1);
                builder.append_u8(*index);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: BlockNumber,
    pub events: Vec<LedgerEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("transaction reverted: {0}")]
    Reverted(#[from] LedgerError),
    #[error("ledger unavailable")]
    Unavailable,
    #[error("transaction {0} dropped before finality")]
    Dropped(TxHash),
}

/// A submitted transaction awaiting finality.
pub struct PendingTransaction {
    hash: TxHash,
    receipt: oneshot::Receiver<Result<TxReceipt, ClientError>>,
}

impl PendingTransaction {
    pub(crate) fn new(
        hash: TxHash,
        receipt: oneshot::Receiver<Result<TxReceipt, ClientError>>,
    ) -> Self {
        Self { hash, receipt }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait until the transaction is final.
    pub async fn wait(self) -> Result<TxReceipt, ClientError> {
        match self.receipt.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Dropped(self.hash)),
        }
    }
}

/// Transaction submission and query surface of the ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn submit(
        &self,
        caller: Address,
        call: LedgerCall,
    ) -> Result<PendingTransaction, ClientError>;

    async fn get_game(&self, player: Address) -> Result<GameView, ClientError>;

    async fn has_active_game(&self, player: Address) -> Result<bool, ClientError>;

    async fn remaining_rounds(&self, player: Address) -> Result<u8, ClientError>;
}

/// Client for a ledger running in this process. Submissions are applied in
/// order by a [`LedgerWorker`] task.
pub struct InProcessLedgerClient {
    ledger: Arc<CardDuelLedger>,
    submit_tx: mpsc::Sender<SubmittedCall>,
    nonce: AtomicU64,
}

impl InProcessLedgerClient {
    /// Spawn the worker and return a client connected to it.
    pub fn spawn(
        ledger: Arc<CardDuelLedger>,
        capacity: usize,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<Result<(), WorkerError>>) {
        let (submit_tx, submit_rx) = mpsc::channel(capacity);
        let worker = LedgerWorker::new(Arc::clone(&ledger), submit_rx);
        let handle = spawn_named_task("ledger_worker", worker.run(cancel));
        (
            Self {
                ledger,
                submit_tx,
                nonce: AtomicU64::new(0),
            },
            handle,
        )
    }

    pub fn ledger(&self) -> &Arc<CardDuelLedger> {
        &self.ledger
    }

    fn tx_hash(&self, caller: &Address, call: &LedgerCall) -> TxHash {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(self.ledger.address().as_bytes());
        hasher.update(caller.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(call.to_signing_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        TxHash::new(bytes)
    }
}

#[async_trait]
impl LedgerClient for InProcessLedgerClient {
    fn contract_address(&self) -> Address {
        self.ledger.address()
    }

    async fn submit(
        &self,
        caller: Address,
        call: LedgerCall,
    ) -> Result<PendingTransaction, ClientError> {
        let hash = self.tx_hash(&caller, &call);
        let (reply, receipt) = oneshot::channel();
        self.submit_tx
            .send(SubmittedCall {
                hash,
                caller,
                call,
                reply,
            })
            .await
            .map_err(|_| ClientError::Unavailable)?;
        debug!(target: LOG_TARGET, tx = %hash, player = %caller, ?call, "submitted");
        Ok(PendingTransaction::new(hash, receipt))
    }

    async fn get_game(&self, player: Address) -> Result<GameView, ClientError> {
        Ok(self.ledger.get_game(&player))
    }

    async fn has_active_game(&self, player: Address) -> Result<bool, ClientError> {
        Ok(self.ledger.has_active_game(&player))
    }

    async fn remaining_rounds(&self, player: Address) -> Result<u8, ClientError> {
        Ok(self.ledger.remaining_rounds(&player))
    }
}
