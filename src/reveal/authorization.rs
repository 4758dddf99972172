use std::sync::Arc;

use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::UniformRand;
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::error::RevealError;
use super::wallet::WalletSigner;
use crate::config::DEFAULT_CHAIN_ID;
use crate::ledger::{Address, PublicKeyBytes, SignatureBytes};
use crate::signing::{Signable, TranscriptBuilder};

const LOG_TARGET: &str = "card_duel::reveal::authorization";

pub const DEFAULT_DURATION_DAYS: u32 = 7;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Curve of the ephemeral reveal keypair.
pub type RevealCurve = ark_bn254::G1Projective;
type RevealScalar = <RevealCurve as PrimeGroup>::ScalarField;

/// Unix-seconds time source.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| OffsetDateTime::now_utc().unix_timestamp().max(0) as u64)
}

/// Keypair generated for a single reveal batch. The relay re-encrypts
/// plaintexts to the public half; the private half never outlives the batch.
pub struct EphemeralKeypair {
    private_key: Zeroizing<Vec<u8>>,
    public_key: PublicKeyBytes,
}

impl EphemeralKeypair {
    pub fn generate<R: Rng>(rng: &mut R) -> Result<Self, RevealError> {
        let secret = RevealScalar::rand(rng);
        let public_key = encode_public_key(secret)?;
        let mut private_key = Zeroizing::new(Vec::new());
        secret
            .serialize_compressed(&mut *private_key)
            .map_err(|err| RevealError::Encoding(err.to_string()))?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    pub fn public_key(&self) -> &PublicKeyBytes {
        &self.public_key
    }

    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

/// Public key matching a serialized ephemeral private key.
pub fn public_key_for(private_key: &[u8]) -> Result<PublicKeyBytes, RevealError> {
    let secret = RevealScalar::deserialize_compressed(private_key)
        .map_err(|err| RevealError::Encoding(err.to_string()))?;
    encode_public_key(secret)
}

fn encode_public_key(secret: RevealScalar) -> Result<PublicKeyBytes, RevealError> {
    let point = (RevealCurve::generator() * secret).into_affine();
    let mut bytes = Vec::new();
    point
        .serialize_compressed(&mut bytes)
        .map_err(|err| RevealError::Encoding(err.to_string()))?;
    Ok(bytes)
}

/// The structured message a wallet signs to let the relay re-encrypt
/// plaintexts to `public_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealAuthorizationMessage {
    pub chain_id: u64,
    #[serde(with = "hex::serde")]
    pub public_key: PublicKeyBytes,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl RevealAuthorizationMessage {
    pub fn expires_at(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days as u64 * SECONDS_PER_DAY)
    }

    pub fn is_valid_at(&self, now: u64) -> bool {
        self.start_timestamp <= now && now < self.expires_at()
    }

    pub fn covers(&self, contract: &Address) -> bool {
        self.contract_addresses.contains(contract)
    }
}

impl Signable for RevealAuthorizationMessage {
    fn domain_kind(&self) -> &'static str {
        "reveal/user_decrypt_request_v1"
    }

    fn write_transcript(&self, builder: &mut TranscriptBuilder) {
        builder.append_u64(self.chain_id);
        builder.append_bytes(&self.public_key);
        builder.append_u64(self.contract_addresses.len() as u64);
        for address in &self.contract_addresses {
            builder.append_address(address);
        }
        builder.append_u64(self.start_timestamp);
        builder.append_u32(self.duration_days);
    }
}

/// A signed authorization plus the keypair it names. Consumed by exactly one
/// reveal batch.
pub struct RevealGrant {
    pub keypair: EphemeralKeypair,
    pub message: RevealAuthorizationMessage,
    pub signature: SignatureBytes,
    pub signer: Address,
}

/// Mints a fresh [`RevealGrant`] per batch.
pub struct RevealAuthorizer {
    chain_id: u64,
    duration_days: u32,
    clock: Clock,
    rng: Mutex<StdRng>,
}

impl RevealAuthorizer {
    pub fn new(duration_days: u32, seed: Option<u64>) -> Self {
        Self::with_clock(duration_days, seed, system_clock())
    }

    pub fn with_clock(duration_days: u32, seed: Option<u64>, clock: Clock) -> Self {
        let rng = seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            duration_days: duration_days.max(1),
            clock,
            rng: Mutex::new(rng),
        }
    }

    /// Bind minted authorizations to `chain_id`.
    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn duration_days(&self) -> u32 {
        self.duration_days
    }

    pub async fn authorize(
        &self,
        signer: Option<&dyn WalletSigner>,
        contracts: Vec<Address>,
    ) -> Result<RevealGrant, RevealError> {
        let signer = signer.ok_or(RevealError::SignerUnavailable)?;

        let keypair = {
            let mut rng = self.rng.lock();
            EphemeralKeypair::generate(&mut *rng)?
        };

        let mut contract_addresses = contracts;
        contract_addresses.sort();
        contract_addresses.dedup();

        let message = RevealAuthorizationMessage {
            chain_id: self.chain_id,
            public_key: keypair.public_key().clone(),
            contract_addresses,
            start_timestamp: (self.clock)(),
            duration_days: self.duration_days,
        };

        let signature = signer.sign_authorization(&message).await.map_err(|err| {
            warn!(target: LOG_TARGET, signer = %signer.address(), %err, "authorization not signed");
            RevealError::AuthorizationRejected(err.to_string())
        })?;

        info!(
            target: LOG_TARGET,
            signer = %signer.address(),
            chain_id = message.chain_id,
            start = message.start_timestamp,
            days = message.duration_days,
            "reveal authorization minted"
        );
        Ok(RevealGrant {
            keypair,
            message,
            signature,
            signer: signer.address(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reveal::wallet::SignerError;
    use crate::test_utils::serde::assert_round_trip_eq;
    use async_trait::async_trait;

    struct FixedSigner {
        reject: bool,
    }

    #[async_trait]
    impl WalletSigner for FixedSigner {
        fn address(&self) -> Address {
            Address::new([0x42; 20])
        }

        async fn sign_authorization(
            &self,
            message: &RevealAuthorizationMessage,
        ) -> Result<SignatureBytes, SignerError> {
            if self.reject {
                return Err(SignerError::Rejected);
            }
            Ok(message.to_signing_bytes())
        }
    }

    fn authorizer(now: u64) -> RevealAuthorizer {
        RevealAuthorizer::with_clock(DEFAULT_DURATION_DAYS, Some(5), Arc::new(move || now))
    }

    #[test]
    fn validity_window_is_half_open() {
        let message = RevealAuthorizationMessage {
            chain_id: DEFAULT_CHAIN_ID,
            public_key: vec![1, 2, 3],
            contract_addresses: vec![Address::new([1u8; 20])],
            start_timestamp: 1_000,
            duration_days: 7,
        };
        assert_eq!(message.expires_at(), 1_000 + 7 * SECONDS_PER_DAY);
        assert!(!message.is_valid_at(999));
        assert!(message.is_valid_at(1_000));
        assert!(!message.is_valid_at(message.expires_at()));
        assert!(message.covers(&Address::new([1u8; 20])));
        assert!(!message.covers(&Address::new([2u8; 20])));
        assert_round_trip_eq(&message);

        let other_chain = RevealAuthorizationMessage {
            chain_id: 1,
            ..message.clone()
        };
        assert_ne!(other_chain.to_signing_bytes(), message.to_signing_bytes());
    }

    #[test]
    fn public_key_is_derivable_from_private_key() {
        let mut rng = StdRng::seed_from_u64(11);
        let keypair = EphemeralKeypair::generate(&mut rng).unwrap();
        assert_eq!(
            &public_key_for(keypair.private_key()).unwrap(),
            keypair.public_key()
        );
        let other = EphemeralKeypair::generate(&mut rng).unwrap();
        assert_ne!(other.public_key(), keypair.public_key());
    }

    #[tokio::test]
    async fn missing_signer_is_reported() {
        let result = authorizer(10)
            .authorize(None, vec![Address::new([1u8; 20])])
            .await;
        assert!(matches!(result, Err(RevealError::SignerUnavailable)));
    }

    #[tokio::test]
    async fn declined_signature_is_rejected() {
        let signer = FixedSigner { reject: true };
        let result = authorizer(10)
            .authorize(Some(&signer), vec![Address::new([1u8; 20])])
            .await;
        assert!(matches!(result, Err(RevealError::AuthorizationRejected(_))));
    }

    #[tokio::test]
    async fn grant_names_sorted_contracts_and_clock_time() {
        let signer = FixedSigner { reject: false };
        let contracts = vec![
            Address::new([9u8; 20]),
            Address::new([1u8; 20]),
            Address::new([9u8; 20]),
        ];
        let grant = authorizer(1_234)
            .authorize(Some(&signer), contracts)
            .await
            .unwrap();
        assert_eq!(
            grant.message.contract_addresses,
            vec![Address::new([1u8; 20]), Address::new([9u8; 20])]
        );
        assert_eq!(grant.message.start_timestamp, 1_234);
        assert_eq!(grant.message.duration_days, 7);
        assert_eq!(grant.signer, signer.address());
        assert_eq!(grant.signature, grant.message.to_signing_bytes());
    }
}
