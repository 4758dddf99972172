use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::authorization::{public_key_for, Clock, RevealAuthorizationMessage, RevealGrant};
use super::wallet::SignatureValidator;
use crate::config::DEFAULT_CHAIN_ID;
use crate::ledger::{
    Address, InMemoryCoprocessor, Plaintext, PublicKeyBytes, SignatureBytes, ValueHandle,
};
use crate::signing::Signable;

const LOG_TARGET: &str = "card_duel::reveal::relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleContractPair {
    pub handle: ValueHandle,
    pub contract: Address,
}

/// Everything the relay needs to re-encrypt a batch of handles for one caller.
pub struct UserDecryptRequest {
    pub handles: Vec<HandleContractPair>,
    pub private_key: Zeroizing<Vec<u8>>,
    pub public_key: PublicKeyBytes,
    pub signature: SignatureBytes,
    pub contract_addresses: Vec<Address>,
    pub caller: Address,
    pub chain_id: u64,
    pub start_timestamp: u64,
    pub duration_days: u32,
}

impl UserDecryptRequest {
    pub fn from_grant(grant: &RevealGrant, handles: Vec<HandleContractPair>) -> Self {
        Self {
            handles,
            private_key: Zeroizing::new(grant.keypair.private_key().to_vec()),
            public_key: grant.keypair.public_key().clone(),
            signature: grant.signature.clone(),
            contract_addresses: grant.message.contract_addresses.clone(),
            caller: grant.signer,
            chain_id: grant.message.chain_id,
            start_timestamp: grant.message.start_timestamp,
            duration_days: grant.message.duration_days,
        }
    }

    /// The message the caller is expected to have signed.
    pub fn authorization_message(&self) -> RevealAuthorizationMessage {
        RevealAuthorizationMessage {
            chain_id: self.chain_id,
            public_key: self.public_key.clone(),
            contract_addresses: self.contract_addresses.clone(),
            start_timestamp: self.start_timestamp,
            duration_days: self.duration_days,
        }
    }
}

/// A relay call that did not fully succeed. `resolved` holds whatever the
/// relay did decrypt before giving up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct RelayFailure {
    pub resolved: HashMap<ValueHandle, Plaintext>,
    pub reason: String,
}

impl RelayFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            resolved: HashMap::new(),
            reason: reason.into(),
        }
    }
}

/// External decryption relay. Handles that are still being computed are
/// absent from a successful response.
#[async_trait]
pub trait DecryptionRelay: Send + Sync {
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<ValueHandle, Plaintext>, RelayFailure>;
}

/// Relay backed by the in-memory coprocessor.
pub struct CoprocessorRelay {
    chain_id: u64,
    coprocessor: Arc<InMemoryCoprocessor>,
    signatures: Arc<dyn SignatureValidator>,
    clock: Clock,
}

impl CoprocessorRelay {
    pub fn new(
        coprocessor: Arc<InMemoryCoprocessor>,
        signatures: Arc<dyn SignatureValidator>,
        clock: Clock,
    ) -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            coprocessor,
            signatures,
            clock,
        }
    }

    /// Serve authorizations minted for `chain_id` only.
    pub fn on_chain(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    fn check_grant(&self, request: &UserDecryptRequest) -> Result<(), RelayFailure> {
        let message = request.authorization_message();
        if message.chain_id != self.chain_id {
            return Err(RelayFailure::new(format!(
                "authorization for chain {} on a relay serving chain {}",
                message.chain_id, self.chain_id
            )));
        }
        if !message.is_valid_at((self.clock)()) {
            return Err(RelayFailure::new("authorization outside its validity window"));
        }
        if let Some(pair) = request
            .handles
            .iter()
            .find(|pair| !message.covers(&pair.contract))
        {
            return Err(RelayFailure::new(format!(
                "contract {} not covered by authorization",
                pair.contract
            )));
        }
        let derived = public_key_for(&request.private_key)
            .map_err(|err| RelayFailure::new(err.to_string()))?;
        if derived != request.public_key {
            return Err(RelayFailure::new("keypair mismatch"));
        }
        if !self.signatures.verify(
            &request.caller,
            &message.to_signing_bytes(),
            &request.signature,
        ) {
            return Err(RelayFailure::new("invalid authorization signature"));
        }
        Ok(())
    }
}

#[async_trait]
impl DecryptionRelay for CoprocessorRelay {
    async fn user_decrypt(
        &self,
        request: UserDecryptRequest,
    ) -> Result<HashMap<ValueHandle, Plaintext>, RelayFailure> {
        self.check_grant(&request)?;

        let mut resolved = HashMap::with_capacity(request.handles.len());
        let mut refused = Vec::new();
        for pair in &request.handles {
            let permitted = self.coprocessor.is_allowed(&pair.handle, &request.caller)
                && self.coprocessor.is_allowed(&pair.handle, &pair.contract);
            if !permitted || !self.coprocessor.is_known(&pair.handle) {
                refused.push(pair.handle);
                continue;
            }
            match self.coprocessor.plaintext(&pair.handle) {
                Some(value) => {
                    resolved.insert(pair.handle, value);
                }
                None => debug!(target: LOG_TARGET, handle = %pair.handle, "value still computing"),
            }
        }

        if refused.is_empty() {
            return Ok(resolved);
        }
        warn!(
            target: LOG_TARGET,
            caller = %request.caller,
            refused = refused.len(),
            resolved = resolved.len(),
            "relay refused handles"
        );
        Err(RelayFailure {
            resolved,
            reason: format!("caller not permitted to decrypt {} handle(s)", refused.len()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Coprocessor;
    use crate::reveal::authorization::RevealAuthorizer;
    use crate::reveal::wallet::{
        SchnorrSignatureValidator, SchnorrWallet, WalletScheme, WalletSigner,
    };
    use ark_crypto_primitives::signature::SignatureScheme;
    use rand::{rngs::StdRng, SeedableRng};

    const CONTRACT: Address = Address::new([0xcc; 20]);
    const NOW: u64 = 1_700_000_000;

    struct Fixture {
        coprocessor: Arc<InMemoryCoprocessor>,
        wallet: SchnorrWallet,
        relay: CoprocessorRelay,
        authorizer: RevealAuthorizer,
    }

    fn fixture(relay_now: u64) -> Fixture {
        let mut rng = StdRng::seed_from_u64(99);
        let params = Arc::new(WalletScheme::setup(&mut rng).unwrap());
        let wallet = SchnorrWallet::generate(Arc::clone(&params), &mut rng).unwrap();
        let validator = Arc::new(SchnorrSignatureValidator::new(params));
        validator.register(wallet.public_key()).unwrap();
        let coprocessor = Arc::new(InMemoryCoprocessor::new(4));
        let relay = CoprocessorRelay::new(
            Arc::clone(&coprocessor),
            validator,
            Arc::new(move || relay_now),
        );
        let authorizer = RevealAuthorizer::with_clock(7, Some(1), Arc::new(|| NOW));
        Fixture {
            coprocessor,
            wallet,
            relay,
            authorizer,
        }
    }

    fn granted_value(fixture: &Fixture, value: u8) -> ValueHandle {
        let handle = fixture
            .coprocessor
            .add_scalar(ValueHandle::SENTINEL, value)
            .unwrap();
        fixture.coprocessor.allow(handle, CONTRACT);
        fixture.coprocessor.allow(handle, fixture.wallet.address());
        handle
    }

    async fn request(fixture: &Fixture, handles: &[ValueHandle]) -> UserDecryptRequest {
        let grant = fixture
            .authorizer
            .authorize(Some(&fixture.wallet), vec![CONTRACT])
            .await
            .unwrap();
        let pairs = handles
            .iter()
            .map(|handle| HandleContractPair {
                handle: *handle,
                contract: CONTRACT,
            })
            .collect();
        UserDecryptRequest::from_grant(&grant, pairs)
    }

    #[tokio::test]
    async fn granted_handles_are_decrypted() {
        let fixture = fixture(NOW + 60);
        let a = granted_value(&fixture, 4);
        let b = granted_value(&fixture, 9);
        let values = fixture
            .relay
            .user_decrypt(request(&fixture, &[a, b]).await)
            .await
            .unwrap();
        assert_eq!(values.get(&a), Some(&4));
        assert_eq!(values.get(&b), Some(&9));
    }

    #[tokio::test]
    async fn computing_handles_are_omitted() {
        let fixture = fixture(NOW);
        let ready = granted_value(&fixture, 2);
        let computing = granted_value(&fixture, 3);
        fixture.coprocessor.withhold(computing);
        let values = fixture
            .relay
            .user_decrypt(request(&fixture, &[ready, computing]).await)
            .await
            .unwrap();
        assert_eq!(values.len(), 1);
        assert!(!values.contains_key(&computing));
    }

    #[tokio::test]
    async fn ungranted_handle_fails_but_keeps_partial_results() {
        let fixture = fixture(NOW);
        let granted = granted_value(&fixture, 5);
        let secret = fixture
            .coprocessor
            .add_scalar(ValueHandle::SENTINEL, 6)
            .unwrap();
        let failure = fixture
            .relay
            .user_decrypt(request(&fixture, &[granted, secret]).await)
            .await
            .unwrap_err();
        assert_eq!(failure.resolved.get(&granted), Some(&5));
        assert!(!failure.resolved.contains_key(&secret));
    }

    #[tokio::test]
    async fn expired_authorization_is_refused() {
        let fixture = fixture(NOW + 7 * 86_400);
        let handle = granted_value(&fixture, 1);
        let failure = fixture
            .relay
            .user_decrypt(request(&fixture, &[handle]).await)
            .await
            .unwrap_err();
        assert!(failure.resolved.is_empty());
        assert!(failure.reason.contains("validity window"));
    }

    #[tokio::test]
    async fn tampered_request_is_refused() {
        let fixture = fixture(NOW);
        let handle = granted_value(&fixture, 1);

        let mut wrong_scope = request(&fixture, &[handle]).await;
        wrong_scope.handles[0].contract = Address::new([0xdd; 20]);
        assert!(fixture.relay.user_decrypt(wrong_scope).await.is_err());

        let mut wrong_key = request(&fixture, &[handle]).await;
        let other = request(&fixture, &[handle]).await;
        wrong_key.public_key = other.public_key.clone();
        let failure = fixture.relay.user_decrypt(wrong_key).await.unwrap_err();
        assert_eq!(failure.reason, "keypair mismatch");

        let mut wrong_caller = request(&fixture, &[handle]).await;
        wrong_caller.caller = Address::new([0x01; 20]);
        let failure = fixture.relay.user_decrypt(wrong_caller).await.unwrap_err();
        assert_eq!(failure.reason, "invalid authorization signature");

        let mut wrong_chain = request(&fixture, &[handle]).await;
        wrong_chain.chain_id = 1;
        let failure = fixture.relay.user_decrypt(wrong_chain).await.unwrap_err();
        assert!(failure.reason.contains("chain 1"));
    }

    #[tokio::test]
    async fn authorization_for_another_chain_is_refused() {
        let fixture = fixture(NOW);
        let handle = granted_value(&fixture, 3);
        let grant = RevealAuthorizer::with_clock(7, Some(2), Arc::new(|| NOW))
            .on_chain(31_337)
            .authorize(Some(&fixture.wallet), vec![CONTRACT])
            .await
            .unwrap();
        assert_eq!(grant.message.chain_id, 31_337);
        let pairs = vec![HandleContractPair {
            handle,
            contract: CONTRACT,
        }];
        let failure = fixture
            .relay
            .user_decrypt(UserDecryptRequest::from_grant(&grant, pairs))
            .await
            .unwrap_err();
        assert!(failure.resolved.is_empty());
        assert!(failure.reason.contains("chain 31337"));
    }
}
