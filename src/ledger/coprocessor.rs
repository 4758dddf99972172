use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use super::types::{Address, Plaintext, ValueHandle, HAND_SIZE, MAX_RANK, MIN_RANK};

const LOG_TARGET: &str = "card_duel::ledger::coprocessor";
const DOMAIN_HANDLE: &[u8] = b"card-duel/coprocessor/handle/v1";

/// Protocol identifier reported by the in-memory coprocessor.
pub const LOCAL_PROTOCOL_ID: u64 = 10001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoprocessorError {
    #[error("unknown handle {0}")]
    UnknownHandle(ValueHandle),
    #[error("invalid deal: {0}")]
    InvalidDeal(&'static str),
}

/// Encrypted hands produced by one deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deal {
    pub player: [ValueHandle; HAND_SIZE],
    pub system: [ValueHandle; HAND_SIZE],
}

/// Ciphertext operations the ledger relies on. Implementations only have to
/// honour the contract: disjoint hands of distinct ranks, a total order for
/// comparisons, and exact scalar addition. Every operation yields a fresh
/// handle. The sentinel handle is read as plaintext zero.
pub trait Coprocessor: Send + Sync {
    fn protocol_id(&self) -> u64;

    fn deal(&self) -> Result<Deal, CoprocessorError>;

    /// Encrypted boolean `lhs > rhs`.
    fn gt(&self, lhs: ValueHandle, rhs: ValueHandle) -> Result<ValueHandle, CoprocessorError>;

    /// Encrypted boolean `lhs < rhs`.
    fn lt(&self, lhs: ValueHandle, rhs: ValueHandle) -> Result<ValueHandle, CoprocessorError>;

    /// Encrypted `condition ? if_true : if_false`.
    fn select(
        &self,
        condition: ValueHandle,
        if_true: ValueHandle,
        if_false: ValueHandle,
    ) -> Result<ValueHandle, CoprocessorError>;

    fn add_scalar(&self, value: ValueHandle, scalar: u8) -> Result<ValueHandle, CoprocessorError>;

    /// Grant `account` the right to request a reveal of `handle`.
    fn allow(&self, handle: ValueHandle, account: Address);
}

/// Coprocessor that keeps plaintexts in memory. Used by the local stack and
/// tests; ciphertext secrecy is simulated by only exposing plaintexts through
/// the access list.
pub struct InMemoryCoprocessor {
    values: DashMap<ValueHandle, Plaintext>,
    acl: DashMap<ValueHandle, HashSet<Address>>,
    withheld: DashSet<ValueHandle>,
    counter: AtomicU64,
    rng: Mutex<StdRng>,
    scripted: Mutex<VecDeque<([u8; HAND_SIZE], [u8; HAND_SIZE])>>,
}

impl InMemoryCoprocessor {
    pub fn new(seed: u64) -> Self {
        Self {
            values: DashMap::new(),
            acl: DashMap::new(),
            withheld: DashSet::new(),
            counter: AtomicU64::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            scripted: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a fixed deal to be used by the next `deal` call instead of
    /// random sampling.
    pub fn script_deal(
        &self,
        player: [u8; HAND_SIZE],
        system: [u8; HAND_SIZE],
    ) -> Result<(), CoprocessorError> {
        validate_deal(&player, &system)?;
        self.scripted.lock().push_back((player, system));
        Ok(())
    }

    /// Plaintext behind a handle, or `None` if the handle is unknown or its
    /// computation has not finished.
    pub fn plaintext(&self, handle: &ValueHandle) -> Option<Plaintext> {
        if handle.is_sentinel() {
            return Some(0);
        }
        if self.withheld.contains(handle) {
            return None;
        }
        self.values.get(handle).map(|value| *value)
    }

    pub fn is_known(&self, handle: &ValueHandle) -> bool {
        handle.is_sentinel() || self.values.contains_key(handle)
    }

    pub fn is_allowed(&self, handle: &ValueHandle, account: &Address) -> bool {
        handle.is_sentinel()
            || self
                .acl
                .get(handle)
                .map(|accounts| accounts.contains(account))
                .unwrap_or(false)
    }

    /// Mark a handle as still computing; reveals skip it until released.
    pub fn withhold(&self, handle: ValueHandle) {
        self.withheld.insert(handle);
    }

    pub fn release(&self, handle: &ValueHandle) {
        self.withheld.remove(handle);
    }

    fn read(&self, handle: ValueHandle) -> Result<Plaintext, CoprocessorError> {
        if handle.is_sentinel() {
            return Ok(0);
        }
        self.values
            .get(&handle)
            .map(|value| *value)
            .ok_or(CoprocessorError::UnknownHandle(handle))
    }

    fn store(&self, op: &'static str, value: Plaintext) -> ValueHandle {
        let nonce = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN_HANDLE);
        hasher.update((op.len() as u16).to_be_bytes());
        hasher.update(op.as_bytes());
        hasher.update(nonce.to_be_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        let handle = ValueHandle::new(bytes);
        self.values.insert(handle, value);
        handle
    }

    fn sample_ranks(&self) -> ([u8; HAND_SIZE], [u8; HAND_SIZE]) {
        if let Some(scripted) = self.scripted.lock().pop_front() {
            return scripted;
        }
        let span = (MAX_RANK - MIN_RANK + 1) as usize;
        let mut rng = self.rng.lock();
        let picks = rand::seq::index::sample(&mut *rng, span, HAND_SIZE * 2);
        let mut ranks = picks.iter().map(|i| MIN_RANK + i as u8);
        let player = std::array::from_fn(|_| ranks.next().unwrap_or(MIN_RANK));
        let system = std::array::from_fn(|_| ranks.next().unwrap_or(MIN_RANK));
        (player, system)
    }
}

impl Coprocessor for InMemoryCoprocessor {
    fn protocol_id(&self) -> u64 {
        LOCAL_PROTOCOL_ID
    }

    fn deal(&self) -> Result<Deal, CoprocessorError> {
        let (player, system) = self.sample_ranks();
        validate_deal(&player, &system)?;
        debug!(target: LOG_TARGET, "dealt two disjoint hands");
        Ok(Deal {
            player: player.map(|rank| self.store("deal", rank as Plaintext)),
            system: system.map(|rank| self.store("deal", rank as Plaintext)),
        })
    }

    fn gt(&self, lhs: ValueHandle, rhs: ValueHandle) -> Result<ValueHandle, CoprocessorError> {
        let result = self.read(lhs)? > self.read(rhs)?;
        Ok(self.store("gt", result as Plaintext))
    }

    fn lt(&self, lhs: ValueHandle, rhs: ValueHandle) -> Result<ValueHandle, CoprocessorError> {
        let result = self.read(lhs)? < self.read(rhs)?;
        Ok(self.store("lt", result as Plaintext))
    }

    fn select(
        &self,
        condition: ValueHandle,
        if_true: ValueHandle,
        if_false: ValueHandle,
    ) -> Result<ValueHandle, CoprocessorError> {
        let chosen = if self.read(condition)? != 0 {
            self.read(if_true)?
        } else {
            self.read(if_false)?
        };
        Ok(self.store("select", chosen))
    }

    fn add_scalar(&self, value: ValueHandle, scalar: u8) -> Result<ValueHandle, CoprocessorError> {
        let sum = self.read(value)?.saturating_add(scalar as Plaintext);
        Ok(self.store("add", sum))
    }

    fn allow(&self, handle: ValueHandle, account: Address) {
        if handle.is_sentinel() {
            return;
        }
        self.acl.entry(handle).or_default().insert(account);
    }
}

fn validate_deal(
    player: &[u8; HAND_SIZE],
    system: &[u8; HAND_SIZE],
) -> Result<(), CoprocessorError> {
    let in_range = |rank: &u8| (MIN_RANK..=MAX_RANK).contains(rank);
    if !player.iter().all(in_range) || !system.iter().all(in_range) {
        return Err(CoprocessorError::InvalidDeal("rank out of range"));
    }
    let player_set: HashSet<u8> = player.iter().copied().collect();
    let system_set: HashSet<u8> = system.iter().copied().collect();
    if player_set.len() != HAND_SIZE || system_set.len() != HAND_SIZE {
        return Err(CoprocessorError::InvalidDeal("hand contains duplicate ranks"));
    }
    if !player_set.is_disjoint(&system_set) {
        return Err(CoprocessorError::InvalidDeal("hands share a rank"));
    }
    Ok(())
}
