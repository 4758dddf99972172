//! On-ledger card duel: game records over encrypted value handles, the
//! contract state machine, and the transaction client used to drive it.

pub mod client;
pub mod contract;
pub mod coprocessor;
pub mod errors;
pub mod events;
pub mod record;
pub mod state;
pub mod types;
pub mod worker;

pub use client::{
    ClientError, InProcessLedgerClient, LedgerCall, LedgerClient, PendingTransaction, TxReceipt,
    DEFAULT_SUBMIT_CAPACITY,
};
pub use contract::CardDuelLedger;
pub use coprocessor::{
    Coprocessor, CoprocessorError, Deal, InMemoryCoprocessor, LOCAL_PROTOCOL_ID,
};
pub use errors::{InvalidMove, LedgerError, StateError};
pub use events::LedgerEvent;
pub use record::{GameRecord, GameView, Hand};
pub use state::LedgerState;
pub use types::{
    Address, BlockNumber, HexParseError, Plaintext, PublicKeyBytes, SignatureBytes, TxHash,
    ValueHandle, HAND_SIZE, MAX_RANK, MIN_RANK,
};
pub use worker::{LedgerWorker, WorkerError};
