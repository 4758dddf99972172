use thiserror::Error;

use super::coprocessor::CoprocessorError;

/// Rejections raised before any state mutation. Display strings are the
/// ledger's revert reasons and are surfaced to participants verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidMove {
    #[error("Game not active")]
    GameNotActive,
    #[error("Invalid card index")]
    IndexOutOfRange { index: u8 },
    #[error("Card already used")]
    CardAlreadyUsed { index: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),
    #[error("caller identity is required")]
    MissingCaller,
    #[error("coprocessor error: {0}")]
    Coprocessor(#[from] CoprocessorError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("record invariant violated: {0}")]
    InvariantViolation(&'static str),
}
