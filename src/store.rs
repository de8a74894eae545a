//! Keyed state store.
//!
//! The key -> slot map is a `DashMap`, so inserting a key that several
//! requests see for the first time at once produces exactly one slot. Each
//! slot carries its own mutex: checks on the same key are serialized while
//! checks on different keys never wait on each other.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::key::RateLimitKey;

/// Per-key state plus its access stamp.
pub struct Slot<S> {
    state: Mutex<S>,
    last_access: AtomicU64,
}

impl<S> Slot<S> {
    fn new(state: S, tick: u64) -> Self {
        Self {
            state: Mutex::new(state),
            last_access: AtomicU64::new(tick),
        }
    }

    /// Lock this key's state.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock()
    }

    fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
    }

    fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

pub struct KeyedStore<S> {
    entries: DashMap<RateLimitKey, Arc<Slot<S>>>,
    /// Least-recently-used eviction threshold. `None` keeps every key.
    /// Eviction is a linear scan over the map.
    max_keys: Option<usize>,
    ticks: AtomicU64,
}

impl<S> KeyedStore<S> {
    pub fn new() -> Self {
        Self::with_max_keys(None)
    }

    pub fn with_max_keys(max_keys: Option<usize>) -> Self {
        Self {
            entries: DashMap::new(),
            max_keys,
            ticks: AtomicU64::new(0),
        }
    }

    /// Return the slot for `key`, creating it with `factory` if absent.
    pub fn get_or_create<F>(&self, key: &RateLimitKey, factory: F) -> Arc<Slot<S>>
    where
        F: FnOnce() -> S,
    {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);

        if let Some(slot) = self.entries.get(key) {
            slot.touch(tick);
            return Arc::clone(slot.value());
        }

        let (slot, created) = match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => (Arc::clone(occupied.get()), false),
            Entry::Vacant(vacant) => {
                let slot = Arc::new(Slot::new(factory(), tick));
                vacant.insert(Arc::clone(&slot));
                (slot, true)
            }
        };
        slot.touch(tick);

        if created {
            debug!(key = %key, "Created rate limit state");
            self.evict_if_needed(key);
        }

        slot
    }

    /// Run `f` with exclusive access to the state for `key`.
    pub fn with_lock<F, G, T>(&self, key: &RateLimitKey, factory: F, f: G) -> T
    where
        F: FnOnce() -> S,
        G: FnOnce(&mut S) -> T,
    {
        let slot = self.get_or_create(key, factory);
        let mut state = slot.lock();
        f(&mut state)
    }

    /// Read the state for `key` without creating it or refreshing its LRU stamp.
    pub fn peek<G, T>(&self, key: &RateLimitKey, f: G) -> Option<T>
    where
        G: FnOnce(&S) -> T,
    {
        let slot = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        let state = slot.lock();
        Some(f(&state))
    }

    pub fn remove(&self, key: &RateLimitKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_keys(&self) -> Option<usize> {
        self.max_keys
    }

    /// Drop least-recently-used keys until the store is back under `max_keys`.
    ///
    /// Finding the victim scans every entry, so each insert past the cap costs
    /// O(n) in the number of tracked keys. Lookups of resident keys never pay it.
    fn evict_if_needed(&self, keep: &RateLimitKey) {
        let Some(max_keys) = self.max_keys else {
            return;
        };

        while self.entries.len() > max_keys {
            let victim = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep)
                .min_by_key(|entry| entry.value().last_access())
                .map(|entry| entry.key().clone());

            match victim {
                Some(victim) => {
                    debug!(key = %victim, max_keys, "Evicting least recently used key");
                    self.entries.remove(&victim);
                }
                None => break,
            }
        }
    }
}

impl<S> Default for KeyedStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::EndpointClass;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn key(identity: &str) -> RateLimitKey {
        RateLimitKey::new(identity, EndpointClass::Shorten)
    }

    #[test]
    fn test_get_or_create_reuses_existing_state() {
        let store: KeyedStore<u32> = KeyedStore::new();
        store.with_lock(&key("alice"), || 0, |n| *n += 1);
        store.with_lock(&key("alice"), || 100, |n| *n += 1);

        assert_eq!(store.peek(&key("alice"), |n| *n), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_peek_does_not_create() {
        let store: KeyedStore<u32> = KeyedStore::new();
        assert_eq!(store.peek(&key("ghost"), |n| *n), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_first_access_creates_one_state() {
        let store: KeyedStore<u32> = KeyedStore::new();
        let factory_calls = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        store.with_lock(
                            &key("fresh"),
                            || {
                                factory_calls.fetch_add(1, Ordering::SeqCst);
                                0
                            },
                            |n| *n += 1,
                        );
                    }
                });
            }
        });

        assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.peek(&key("fresh"), |n| *n), Some(1600));
    }

    #[test]
    fn test_lru_eviction_removes_least_recently_used() {
        let store: KeyedStore<u32> = KeyedStore::with_max_keys(Some(2));
        store.with_lock(&key("a"), || 0, |_| ());
        store.with_lock(&key("b"), || 0, |_| ());
        // Touch "a" so "b" becomes the oldest.
        store.with_lock(&key("a"), || 0, |_| ());
        store.with_lock(&key("c"), || 0, |_| ());

        assert_eq!(store.len(), 2);
        assert!(store.peek(&key("a"), |_| ()).is_some());
        assert!(store.peek(&key("b"), |_| ()).is_none());
        assert!(store.peek(&key("c"), |_| ()).is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let store: KeyedStore<u32> = KeyedStore::new();
        store.with_lock(&key("a"), || 0, |_| ());
        store.with_lock(&key("b"), || 0, |_| ());

        assert!(store.remove(&key("a")));
        assert!(!store.remove(&key("a")));
        store.clear();
        assert!(store.is_empty());
    }
}
