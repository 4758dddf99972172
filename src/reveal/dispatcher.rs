use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::authorization::RevealAuthorizer;
use super::cache::RevealCache;
use super::error::RevealError;
use super::relay::{DecryptionRelay, HandleContractPair, UserDecryptRequest};
use super::wallet::WalletSigner;
use crate::ledger::{Address, ValueHandle};

const LOG_TARGET: &str = "card_duel::reveal::dispatcher";

/// Outcome of one reveal pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevealReport {
    /// Handles sent to the relay.
    pub requested: usize,
    /// Plaintexts newly merged into the cache.
    pub resolved: usize,
    /// Requested handles the relay did not return yet.
    pub unresolved: Vec<ValueHandle>,
}

impl RevealReport {
    pub fn is_noop(&self) -> bool {
        self.requested == 0
    }
}

/// Turns candidate handles into cached plaintexts. Each handle has at most
/// one outstanding request and cached handles are never requested again.
pub struct RevealDispatcher {
    cache: RevealCache,
    in_flight: Arc<Mutex<HashSet<ValueHandle>>>,
    authorizer: Arc<RevealAuthorizer>,
    relay: Arc<dyn DecryptionRelay>,
    contract: Address,
}

impl RevealDispatcher {
    pub fn new(
        cache: RevealCache,
        authorizer: Arc<RevealAuthorizer>,
        relay: Arc<dyn DecryptionRelay>,
        contract: Address,
    ) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            authorizer,
            relay,
            contract,
        }
    }

    pub fn cache(&self) -> &RevealCache {
        &self.cache
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Reveal every candidate not yet cached or in flight, using one freshly
    /// minted authorization. Does nothing, and asks for no signature, when no
    /// candidate qualifies.
    pub async fn reveal<I>(
        &self,
        candidates: I,
        signer: Option<&dyn WalletSigner>,
    ) -> Result<RevealReport, RevealError>
    where
        I: IntoIterator<Item = ValueHandle>,
    {
        let claim = self.claim(candidates);
        if claim.handles.is_empty() {
            debug!(target: LOG_TARGET, "nothing new to reveal");
            return Ok(RevealReport::default());
        }
        let requested = claim.handles.len();

        let grant = self
            .authorizer
            .authorize(signer, vec![self.contract])
            .await?;
        let pairs = claim
            .handles
            .iter()
            .map(|handle| HandleContractPair {
                handle: *handle,
                contract: self.contract,
            })
            .collect();
        let request = UserDecryptRequest::from_grant(&grant, pairs);
        drop(grant);

        debug!(target: LOG_TARGET, requested, "dispatching reveal batch");
        let (values, failure) = match self.relay.user_decrypt(request).await {
            Ok(values) => (values, None),
            Err(failure) => (failure.resolved, Some(failure.reason)),
        };

        let owned = values
            .into_iter()
            .filter(|(handle, _)| claim.owns(handle));
        let Some(resolved) = self.cache.merge_in_epoch(claim.epoch, owned) else {
            debug!(
                target: LOG_TARGET,
                requested,
                "cache was reset while the batch was in flight; results dropped"
            );
            return Ok(RevealReport {
                requested,
                resolved: 0,
                unresolved: claim.handles.clone(),
            });
        };
        let unresolved = self.unresolved(&claim.handles);

        match failure {
            None => {
                info!(
                    target: LOG_TARGET,
                    requested,
                    resolved,
                    pending = unresolved.len(),
                    "reveal batch settled"
                );
                Ok(RevealReport {
                    requested,
                    resolved,
                    unresolved,
                })
            }
            Some(reason) => {
                warn!(
                    target: LOG_TARGET,
                    requested,
                    resolved,
                    pending = unresolved.len(),
                    %reason,
                    "reveal batch failed"
                );
                Err(RevealError::DecryptionFailed {
                    reason,
                    resolved,
                    unresolved,
                })
            }
        }
    }

    /// Filter against the latest cache and mark the survivors in flight,
    /// under one lock.
    fn claim<I>(&self, candidates: I) -> InFlightClaim
    where
        I: IntoIterator<Item = ValueHandle>,
    {
        let unique: BTreeSet<ValueHandle> = candidates
            .into_iter()
            .filter(|handle| !handle.is_sentinel())
            .collect();

        let epoch = self.cache.epoch();
        let mut in_flight = self.in_flight.lock();
        let handles: Vec<ValueHandle> = unique
            .into_iter()
            .filter(|handle| !self.cache.contains(handle) && !in_flight.contains(handle))
            .collect();
        in_flight.extend(handles.iter().copied());

        InFlightClaim {
            handles,
            epoch,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    fn unresolved(&self, handles: &[ValueHandle]) -> Vec<ValueHandle> {
        handles
            .iter()
            .filter(|handle| !self.cache.contains(handle))
            .copied()
            .collect()
    }
}

/// Handles owned by one outstanding batch; released when the batch settles.
struct InFlightClaim {
    /// Sorted.
    handles: Vec<ValueHandle>,
    epoch: u64,
    in_flight: Arc<Mutex<HashSet<ValueHandle>>>,
}

impl InFlightClaim {
    fn owns(&self, handle: &ValueHandle) -> bool {
        self.handles.binary_search(handle).is_ok()
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock();
        for handle in &self.handles {
            in_flight.remove(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::{mpsc, Notify};

    use super::*;
    use crate::ledger::{Plaintext, SignatureBytes};
    use crate::reveal::authorization::RevealAuthorizationMessage;
    use crate::reveal::relay::RelayFailure;
    use crate::reveal::wallet::SignerError;

    const CONTRACT: Address = Address::new([0xcc; 20]);

    fn handle(byte: u8) -> ValueHandle {
        ValueHandle::new([byte; 32])
    }

    #[derive(Default)]
    struct CountingSigner {
        signatures: AtomicUsize,
    }

    #[async_trait]
    impl WalletSigner for CountingSigner {
        fn address(&self) -> Address {
            Address::new([0x51; 20])
        }

        async fn sign_authorization(
            &self,
            _message: &RevealAuthorizationMessage,
        ) -> Result<SignatureBytes, SignerError> {
            self.signatures.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1, 2, 3])
        }
    }

    /// Answers with `value = first byte of handle`, except for handles listed
    /// as computing. Optionally parks the first call until released.
    #[derive(Default)]
    struct ScriptedRelay {
        calls: Mutex<Vec<Vec<ValueHandle>>>,
        computing: HashSet<ValueHandle>,
        fail_with_partial: bool,
        /// Extra pair returned on every call, requested or not.
        stray: Option<(ValueHandle, Plaintext)>,
        park_first: Option<(mpsc::UnboundedSender<()>, Arc<Notify>)>,
    }

    #[async_trait]
    impl DecryptionRelay for ScriptedRelay {
        async fn user_decrypt(
            &self,
            request: UserDecryptRequest,
        ) -> Result<HashMap<ValueHandle, Plaintext>, RelayFailure> {
            let handles: Vec<ValueHandle> = request.handles.iter().map(|p| p.handle).collect();
            let first = {
                let mut calls = self.calls.lock();
                calls.push(handles.clone());
                calls.len() == 1
            };
            if let (true, Some((entered, release))) = (first, &self.park_first) {
                let _ = entered.send(());
                release.notified().await;
            }
            let mut values: HashMap<ValueHandle, Plaintext> = handles
                .iter()
                .filter(|h| !self.computing.contains(h))
                .map(|h| (*h, h.as_bytes()[0] as Plaintext))
                .collect();
            values.extend(self.stray);
            if self.fail_with_partial {
                let resolved = values.into_iter().take(1).collect();
                return Err(RelayFailure {
                    resolved,
                    reason: "relay timeout".into(),
                });
            }
            Ok(values)
        }
    }

    fn dispatcher(relay: Arc<ScriptedRelay>) -> RevealDispatcher {
        let authorizer = Arc::new(RevealAuthorizer::with_clock(7, Some(3), Arc::new(|| 100)));
        RevealDispatcher::new(RevealCache::new(), authorizer, relay, CONTRACT)
    }

    #[tokio::test]
    async fn cached_and_sentinel_handles_cost_nothing() {
        let relay = Arc::new(ScriptedRelay::default());
        let dispatcher = dispatcher(Arc::clone(&relay));
        let signer = CountingSigner::default();
        dispatcher.cache().merge([(handle(4), 4)]);

        let report = dispatcher
            .reveal([ValueHandle::SENTINEL, handle(4), handle(4)], Some(&signer))
            .await
            .unwrap();
        assert!(report.is_noop());
        let empty = dispatcher.reveal(Vec::new(), Some(&signer)).await.unwrap();
        assert!(empty.is_noop());

        assert_eq!(signer.signatures.load(Ordering::SeqCst), 0);
        assert!(relay.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn one_authorization_per_deduplicated_batch() {
        let relay = Arc::new(ScriptedRelay {
            computing: HashSet::from([handle(9)]),
            ..ScriptedRelay::default()
        });
        let dispatcher = dispatcher(Arc::clone(&relay));
        let signer = CountingSigner::default();

        let report = dispatcher
            .reveal(
                [handle(7), handle(3), handle(7), handle(9)],
                Some(&signer),
            )
            .await
            .unwrap();
        assert_eq!(report.requested, 3);
        assert_eq!(report.resolved, 2);
        assert_eq!(report.unresolved, vec![handle(9)]);
        assert_eq!(dispatcher.cache().get(&handle(7)), Some(7));
        assert_eq!(signer.signatures.load(Ordering::SeqCst), 1);
        assert_eq!(
            relay.calls.lock().clone(),
            vec![vec![handle(3), handle(7), handle(9)]]
        );

        // The computing handle is retried; the resolved ones are not.
        dispatcher
            .reveal([handle(3), handle(7), handle(9)], Some(&signer))
            .await
            .unwrap();
        assert_eq!(relay.calls.lock()[1], vec![handle(9)]);
        assert_eq!(signer.signatures.load(Ordering::SeqCst), 2);
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn in_flight_handles_are_not_requested_twice() {
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let relay = Arc::new(ScriptedRelay {
            park_first: Some((entered_tx, Arc::clone(&release))),
            ..ScriptedRelay::default()
        });
        let dispatcher = Arc::new(dispatcher(Arc::clone(&relay)));
        let signer = Arc::new(CountingSigner::default());

        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            let signer = Arc::clone(&signer);
            tokio::spawn(async move {
                dispatcher
                    .reveal([handle(1), handle(2)], Some(signer.as_ref() as &dyn WalletSigner))
                    .await
            })
        };
        entered_rx.recv().await.unwrap();
        assert_eq!(dispatcher.in_flight_count(), 2);

        let second = dispatcher
            .reveal([handle(2), handle(5)], Some(signer.as_ref() as &dyn WalletSigner))
            .await
            .unwrap();
        assert_eq!(second.requested, 1);

        release.notify_one();
        let first = first.await.unwrap().unwrap();
        assert_eq!(first.requested, 2);
        assert_eq!(
            relay.calls.lock().clone(),
            vec![vec![handle(1), handle(2)], vec![handle(5)]]
        );
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failed_batch_keeps_partial_results_and_releases_handles() {
        let relay = Arc::new(ScriptedRelay {
            fail_with_partial: true,
            ..ScriptedRelay::default()
        });
        let dispatcher = dispatcher(relay);
        let signer = CountingSigner::default();

        let err = dispatcher
            .reveal([handle(1), handle(2)], Some(&signer))
            .await
            .unwrap_err();
        match err {
            RevealError::DecryptionFailed {
                resolved,
                unresolved,
                ..
            } => {
                assert_eq!(resolved, 1);
                assert_eq!(unresolved.len(), 1);
            }
            other => panic!("expected decryption failure, got {other:?}"),
        }
        // sentinel + the one merged value
        assert_eq!(dispatcher.cache().len(), 2);
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn unrequested_values_are_not_cached() {
        let relay = Arc::new(ScriptedRelay {
            stray: Some((handle(8), 8)),
            ..ScriptedRelay::default()
        });
        let dispatcher = dispatcher(relay);
        let signer = CountingSigner::default();

        let report = dispatcher.reveal([handle(2)], Some(&signer)).await.unwrap();
        assert_eq!(report.resolved, 1);
        assert!(!dispatcher.cache().contains(&handle(8)));
        assert_eq!(dispatcher.cache().len(), 2);
    }

    #[tokio::test]
    async fn batch_settling_after_a_reset_is_dropped() {
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let release = Arc::new(Notify::new());
        let relay = Arc::new(ScriptedRelay {
            park_first: Some((entered_tx, Arc::clone(&release))),
            ..ScriptedRelay::default()
        });
        let dispatcher = Arc::new(dispatcher(relay));
        let signer = Arc::new(CountingSigner::default());

        let pending = {
            let dispatcher = Arc::clone(&dispatcher);
            let signer = Arc::clone(&signer);
            tokio::spawn(async move {
                dispatcher
                    .reveal([handle(1), handle(2)], Some(signer.as_ref() as &dyn WalletSigner))
                    .await
            })
        };
        entered_rx.recv().await.unwrap();
        dispatcher.cache().reset();
        release.notify_one();

        let report = pending.await.unwrap().unwrap();
        assert_eq!(report.resolved, 0);
        assert_eq!(report.unresolved, vec![handle(1), handle(2)]);
        assert_eq!(dispatcher.cache().len(), 1);
        assert_eq!(dispatcher.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn missing_signer_leaves_cache_untouched() {
        let relay = Arc::new(ScriptedRelay::default());
        let dispatcher = dispatcher(Arc::clone(&relay));
        let err = dispatcher.reveal([handle(1)], None).await.unwrap_err();
        assert_eq!(err, RevealError::SignerUnavailable);
        assert_eq!(dispatcher.cache().len(), 1);
        assert_eq!(dispatcher.in_flight_count(), 0);
        assert!(relay.calls.lock().is_empty());
    }
}
