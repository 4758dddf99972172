//! In-process deployment of every collaborator a session needs: ledger,
//! transaction worker, coprocessor, wallet and relay.

use std::sync::Arc;

use anyhow::{Context, Result};
use ark_crypto_primitives::signature::SignatureScheme;
use rand::{rngs::StdRng, SeedableRng};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SessionConfig;
use crate::ledger::{
    Address, CardDuelLedger, InMemoryCoprocessor, InProcessLedgerClient, LedgerClient,
    WorkerError, DEFAULT_SUBMIT_CAPACITY,
};
use crate::reveal::{
    system_clock, CoprocessorRelay, DecryptionRelay, RevealAuthorizer, RevealCache,
    RevealDispatcher, SchnorrSignatureValidator, SchnorrWallet, WalletScheme, WalletSigner,
};
use crate::session::GameSession;

const LOG_TARGET: &str = "card_duel::local";

/// Ledger address used when the configuration does not name one.
pub const LOCAL_CONTRACT_ADDRESS: Address = Address::new([
    0x36, 0x92, 0x28, 0xcd, 0x84, 0xae, 0xfb, 0x71, 0x3e, 0xf4, 0xe7, 0xe9, 0x6a, 0xd9, 0x84,
    0x53, 0x9e, 0x26, 0x82, 0x5e,
]);

pub struct LocalStack {
    pub coprocessor: Arc<InMemoryCoprocessor>,
    pub ledger: Arc<CardDuelLedger>,
    pub client: Arc<InProcessLedgerClient>,
    pub wallet: Arc<SchnorrWallet>,
    pub validator: Arc<SchnorrSignatureValidator>,
    pub dispatcher: Arc<RevealDispatcher>,
    pub session: Arc<GameSession>,
    cancel: CancellationToken,
    worker: JoinHandle<Result<(), WorkerError>>,
}

impl LocalStack {
    /// Build the stack and start the ledger worker. Must run inside a Tokio
    /// runtime.
    pub fn spawn(config: SessionConfig) -> Result<Self> {
        Self::spawn_with_relay(config, |relay| relay)
    }

    /// Like [`LocalStack::spawn`], letting the caller wrap the relay.
    pub fn spawn_with_relay<F>(config: SessionConfig, wrap_relay: F) -> Result<Self>
    where
        F: FnOnce(Arc<dyn DecryptionRelay>) -> Arc<dyn DecryptionRelay>,
    {
        let seed = config.rng_seed;
        let chain_id = config.chain_id;
        let mut rng = seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);

        let coprocessor = Arc::new(match seed {
            Some(seed) => InMemoryCoprocessor::new(seed),
            None => InMemoryCoprocessor::new(rand::random()),
        });
        let contract = config.contract_address.unwrap_or(LOCAL_CONTRACT_ADDRESS);
        let ledger = Arc::new(CardDuelLedger::new(contract, coprocessor.clone()));

        let cancel = CancellationToken::new();
        let (client, worker) = InProcessLedgerClient::spawn(
            Arc::clone(&ledger),
            DEFAULT_SUBMIT_CAPACITY,
            cancel.clone(),
        );
        let client = Arc::new(client);

        let params = Arc::new(
            WalletScheme::setup(&mut rng)
                .map_err(|err| anyhow::anyhow!("schnorr setup failed: {err}"))?,
        );
        let wallet = Arc::new(
            SchnorrWallet::generate(Arc::clone(&params), &mut rng)
                .context("failed to generate wallet")?,
        );
        let validator = Arc::new(SchnorrSignatureValidator::new(params));
        validator
            .register(wallet.public_key())
            .context("failed to register wallet key")?;

        let relay: Arc<dyn DecryptionRelay> = Arc::new(
            CoprocessorRelay::new(coprocessor.clone(), validator.clone(), system_clock())
                .on_chain(chain_id),
        );
        let authorizer = Arc::new(
            RevealAuthorizer::new(
                config.authorization_days,
                seed.map(|seed| seed.wrapping_add(1)),
            )
            .on_chain(chain_id),
        );
        let dispatcher = Arc::new(RevealDispatcher::new(
            RevealCache::new(),
            authorizer,
            wrap_relay(relay),
            contract,
        ));
        let session = Arc::new(GameSession::new(
            config,
            client.clone() as Arc<dyn LedgerClient>,
            Arc::clone(&dispatcher),
        ));

        info!(
            target: LOG_TARGET,
            contract = %contract,
            chain_id,
            wallet = %wallet.address(),
            protocol_id = ledger.protocol_id(),
            "local stack ready"
        );
        Ok(Self {
            coprocessor,
            ledger,
            client,
            wallet,
            validator,
            dispatcher,
            session,
            cancel,
            worker,
        })
    }

    /// Connect the stack's wallet to the session.
    pub fn connect_wallet(&self) {
        self.session.connect(
            self.wallet.address(),
            Some(self.wallet.clone() as Arc<dyn WalletSigner>),
        );
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.worker
            .await
            .context("ledger worker panicked")?
            .context("ledger worker failed")
    }
}
