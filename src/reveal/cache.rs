use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::ledger::{Plaintext, ValueHandle};

/// Client-side map from handle to revealed plaintext. Merges are keyed by
/// handle, so concurrent writers commute. Starts out holding only the
/// sentinel, which reads as zero.
///
/// Every `reset` starts a new epoch. Results fetched under an older epoch are
/// refused by [`RevealCache::merge_in_epoch`].
#[derive(Clone)]
pub struct RevealCache {
    values: Arc<DashMap<ValueHandle, Plaintext>>,
    epoch: Arc<RwLock<u64>>,
}

impl RevealCache {
    pub fn new() -> Self {
        let values = DashMap::new();
        values.insert(ValueHandle::SENTINEL, 0);
        Self {
            values: Arc::new(values),
            epoch: Arc::new(RwLock::new(0)),
        }
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.read()
    }

    pub fn get(&self, handle: &ValueHandle) -> Option<Plaintext> {
        self.values.get(handle).map(|value| *value)
    }

    pub fn contains(&self, handle: &ValueHandle) -> bool {
        self.values.contains_key(handle)
    }

    /// Returns how many entries were newly added.
    pub fn merge<I>(&self, entries: I) -> usize
    where
        I: IntoIterator<Item = (ValueHandle, Plaintext)>,
    {
        entries
            .into_iter()
            .filter(|(handle, value)| self.values.insert(*handle, *value).is_none())
            .count()
    }

    /// Like [`RevealCache::merge`], but only while `epoch` is still current.
    /// Returns `None` when a reset happened in between.
    pub fn merge_in_epoch<I>(&self, epoch: u64, entries: I) -> Option<usize>
    where
        I: IntoIterator<Item = (ValueHandle, Plaintext)>,
    {
        let current = self.epoch.read();
        if *current != epoch {
            return None;
        }
        Some(self.merge(entries))
    }

    /// Back to the sentinel-only state, in a new epoch.
    pub fn reset(&self) {
        let mut epoch = self.epoch.write();
        self.values.retain(|handle, _| handle.is_sentinel());
        self.values.insert(ValueHandle::SENTINEL, 0);
        *epoch += 1;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn snapshot(&self) -> HashMap<ValueHandle, Plaintext> {
        self.values
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect()
    }
}

impl Default for RevealCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(byte: u8) -> ValueHandle {
        ValueHandle::new([byte; 32])
    }

    #[test]
    fn starts_with_sentinel_only() {
        let cache = RevealCache::new();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&ValueHandle::SENTINEL), Some(0));
    }

    #[test]
    fn merge_is_idempotent() {
        let cache = RevealCache::new();
        assert_eq!(cache.merge([(handle(1), 4), (handle(2), 9)]), 2);
        assert_eq!(cache.merge([(handle(1), 4)]), 0);
        assert_eq!(cache.get(&handle(2)), Some(9));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn reset_keeps_sentinel() {
        let cache = RevealCache::new();
        let shared = cache.clone();
        cache.merge([(handle(1), 4)]);
        shared.reset();
        assert!(!cache.contains(&handle(1)));
        assert_eq!(cache.snapshot(), HashMap::from([(ValueHandle::SENTINEL, 0)]));
    }

    #[test]
    fn merge_from_a_previous_epoch_is_refused() {
        let cache = RevealCache::new();
        let before = cache.epoch();
        assert_eq!(cache.merge_in_epoch(before, [(handle(1), 4)]), Some(1));

        cache.reset();
        assert_ne!(cache.epoch(), before);
        assert_eq!(cache.merge_in_epoch(before, [(handle(2), 9)]), None);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.merge_in_epoch(cache.epoch(), [(handle(2), 9)]),
            Some(1)
        );
    }
}
