use thiserror::Error;

use crate::config::ConfigError;
use crate::ledger::{ClientError, InvalidMove, LedgerError};
use crate::reveal::RevealError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("game contract is not configured")]
    Configuration,
    #[error("no participant connected")]
    IdentityUnavailable,
    #[error("signer unavailable")]
    SignerUnavailable,
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),
    #[error(transparent)]
    InvalidMove(#[from] InvalidMove),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("unable to load game state: {0}")]
    StateUnavailable(String),
    #[error("another action is still running")]
    ActionInProgress,
    #[error("no active game")]
    GameNotStarted,
}

impl SessionError {
    /// The single line shown to the participant for this error.
    pub fn status_message(&self) -> String {
        match self {
            SessionError::Configuration => {
                "Set the deployed CardGame address to start playing".into()
            }
            SessionError::IdentityUnavailable => "Connect your wallet to start".into(),
            SessionError::SignerUnavailable => "Signer unavailable".into(),
            SessionError::AuthorizationRejected(_) => "Signature request was declined".into(),
            SessionError::InvalidMove(invalid) => invalid.to_string(),
            SessionError::TransactionFailed(_) => "Transaction failed. Try again.".into(),
            SessionError::DecryptionFailed(_) => "Unable to decrypt game values".into(),
            SessionError::StateUnavailable(_) => "Unable to load game state".into(),
            SessionError::ActionInProgress => "Another action is still running".into(),
            SessionError::GameNotStarted => "Start a new game first".into(),
        }
    }
}

impl From<ConfigError> for SessionError {
    fn from(_: ConfigError) -> Self {
        SessionError::Configuration
    }
}

impl From<ClientError> for SessionError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Reverted(LedgerError::InvalidMove(invalid)) => {
                SessionError::InvalidMove(invalid)
            }
            other => SessionError::TransactionFailed(other.to_string()),
        }
    }
}

impl From<RevealError> for SessionError {
    fn from(err: RevealError) -> Self {
        match err {
            RevealError::SignerUnavailable => SessionError::SignerUnavailable,
            RevealError::AuthorizationRejected(reason) => {
                SessionError::AuthorizationRejected(reason)
            }
            RevealError::DecryptionFailed { reason, .. } => SessionError::DecryptionFailed(reason),
            RevealError::Encoding(reason) => SessionError::DecryptionFailed(reason),
        }
    }
}
