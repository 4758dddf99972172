use thiserror::Error;

use crate::ledger::ValueHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevealError {
    #[error("Signer unavailable")]
    SignerUnavailable,
    #[error("authorization rejected: {0}")]
    AuthorizationRejected(String),
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        reason: String,
        /// Plaintexts merged into the cache before the failure.
        resolved: usize,
        unresolved: Vec<ValueHandle>,
    },
    #[error("key encoding error: {0}")]
    Encoding(String),
}
