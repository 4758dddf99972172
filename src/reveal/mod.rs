//! Reveal pipeline: per-batch authorizations, the decryption relay, and the
//! client-side plaintext cache that fronts it.

pub mod authorization;
pub mod cache;
pub mod dispatcher;
pub mod error;
pub mod relay;
pub mod wallet;

pub use authorization::{
    system_clock, Clock, EphemeralKeypair, RevealAuthorizationMessage, RevealAuthorizer,
    RevealGrant, DEFAULT_DURATION_DAYS,
};
pub use cache::RevealCache;
pub use dispatcher::{RevealDispatcher, RevealReport};
pub use error::RevealError;
pub use relay::{
    CoprocessorRelay, DecryptionRelay, HandleContractPair, RelayFailure, UserDecryptRequest,
};
pub use wallet::{
    SchnorrSignatureValidator, SchnorrWallet, SignatureValidator, SignerError, WalletParameters,
    WalletScheme, WalletSigner,
};
