use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use ark_crypto_primitives::signature::{
    schnorr::{Schnorr, Signature as SchnorrSignature},
    SignatureScheme,
};
use ark_ec::CurveGroup;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use thiserror::Error;
use tracing::debug;

use super::authorization::RevealAuthorizationMessage;
use crate::ledger::{Address, SignatureBytes};
use crate::signing::WithSignature;

const LOG_TARGET: &str = "card_duel::reveal::wallet";

pub type WalletCurve = ark_grumpkin::Projective;
pub type WalletScheme = Schnorr<WalletCurve, Sha256>;
pub type WalletSignature = SchnorrSignature<WalletCurve>;
pub type WalletParameters = <WalletScheme as SignatureScheme>::Parameters;
pub type WalletPublicKey = <WalletScheme as SignatureScheme>::PublicKey;
type WalletSecretKey = <WalletScheme as SignatureScheme>::SecretKey;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignerError {
    #[error("signature request declined")]
    Rejected,
    #[error("signing failed: {0}")]
    Failed(String),
}

/// Wallet collaborator holding the participant's signing identity.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_authorization(
        &self,
        message: &RevealAuthorizationMessage,
    ) -> Result<SignatureBytes, SignerError>;
}

pub trait SignatureEncoder {
    fn to_bytes(&self) -> Result<Vec<u8>>;
}

impl<C> SignatureEncoder for SchnorrSignature<C>
where
    C: CurveGroup,
    C::ScalarField: CanonicalSerialize,
{
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.prover_response
            .serialize_compressed(&mut bytes)
            .map_err(|err| anyhow::anyhow!("signature serialization error: {err}"))?;
        self.verifier_challenge
            .serialize_compressed(&mut bytes)
            .map_err(|err| anyhow::anyhow!("signature serialization error: {err}"))?;
        Ok(bytes)
    }
}

/// Ledger address of a wallet key: the trailing 20 bytes of the Keccak-256
/// digest of the compressed public key.
pub fn address_for(public_key: &WalletPublicKey) -> Result<Address, SignerError> {
    let mut bytes = Vec::new();
    public_key
        .serialize_compressed(&mut bytes)
        .map_err(|err| SignerError::Failed(err.to_string()))?;
    let digest = Keccak256::digest(&bytes);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    Ok(Address::new(address))
}

/// Schnorr wallet over Grumpkin.
pub struct SchnorrWallet {
    address: Address,
    params: Arc<WalletParameters>,
    public_key: WalletPublicKey,
    secret_key: WalletSecretKey,
    rng: Mutex<StdRng>,
    rejecting: AtomicBool,
}

impl SchnorrWallet {
    pub fn generate<R: Rng>(
        params: Arc<WalletParameters>,
        rng: &mut R,
    ) -> Result<Self, SignerError> {
        let (public_key, secret_key) = WalletScheme::keygen(&params, rng)
            .map_err(|err| SignerError::Failed(err.to_string()))?;
        let address = address_for(&public_key)?;
        let signing_rng =
            StdRng::from_rng(&mut *rng).map_err(|err| SignerError::Failed(err.to_string()))?;
        Ok(Self {
            address,
            params,
            public_key,
            secret_key,
            rng: Mutex::new(signing_rng),
            rejecting: AtomicBool::new(false),
        })
    }

    pub fn public_key(&self) -> WalletPublicKey {
        self.public_key
    }

    /// Make subsequent signature requests fail as if the user declined them.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletSigner for SchnorrWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_authorization(
        &self,
        message: &RevealAuthorizationMessage,
    ) -> Result<SignatureBytes, SignerError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(SignerError::Rejected);
        }
        let signed = {
            let mut rng = self.rng.lock();
            WithSignature::<WalletSignature, _>::new::<WalletScheme, _>(
                message.clone(),
                &self.params,
                &self.secret_key,
                &mut *rng,
            )
        }
        .map_err(|err| SignerError::Failed(err.to_string()))?;
        debug!(target: LOG_TARGET, signer = %self.address, "authorization signed");
        signed
            .signature
            .to_bytes()
            .map_err(|err| SignerError::Failed(err.to_string()))
    }
}

/// Checks a signature over a transcript against the key registered for an
/// address.
pub trait SignatureValidator: Send + Sync {
    fn verify(&self, signer: &Address, transcript: &[u8], signature: &[u8]) -> bool;
}

pub struct SchnorrSignatureValidator {
    params: Arc<WalletParameters>,
    keys: DashMap<Address, WalletPublicKey>,
}

impl SchnorrSignatureValidator {
    pub fn new(params: Arc<WalletParameters>) -> Self {
        Self {
            params,
            keys: DashMap::new(),
        }
    }

    pub fn register(&self, public_key: WalletPublicKey) -> Result<Address, SignerError> {
        let address = address_for(&public_key)?;
        self.keys.insert(address, public_key);
        Ok(address)
    }
}

impl SignatureValidator for SchnorrSignatureValidator {
    fn verify(&self, signer: &Address, transcript: &[u8], signature: &[u8]) -> bool {
        let Some(public_key) = self.keys.get(signer).map(|key| *key) else {
            debug!(target: LOG_TARGET, %signer, "no key registered for signer");
            return false;
        };
        let Ok(signature) = WalletSignature::deserialize_compressed(signature) else {
            debug!(target: LOG_TARGET, %signer, "malformed signature");
            return false;
        };
        WalletScheme::verify(&self.params, &public_key, transcript, &signature).unwrap_or(false)
    }
}
