use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::entry::EntryRecord;
use crate::key::{CacheKey, CacheValue};
use crate::timer::{Expired, ExpiryTimer};

/// The bounded, in-memory hot tier (spec.md §3/§4.2).
///
/// Generalizes `cachelito-async`'s `DashMap`-backed concurrent cache map
/// (`AsyncGlobalCache`) to carry a parallel timers map with the same key
/// domain, satisfying `dom(entries) == dom(timers)` without a global lock:
/// every per-key operation here goes through `DashMap`'s sharded locking,
/// never a lock over the whole tier.
///
/// `count` is the authoritative size used for the capacity bound
/// (spec.md §3: `|entries| <= capacity`). `DashMap::len()` is a snapshot
/// racing with concurrent inserts/removes on other shards and cannot
/// gate admission by itself — two callers can each observe room and both
/// insert, overshooting capacity (spec.md §5/§9's TOCTOU hazard). `insert`
/// instead reserves a slot from `count` with `compare_exchange` before
/// ever touching the map, so the reservation and the bound check are one
/// atomic step across all shards.
pub struct ActiveTier<K, V> {
    entries: DashMap<K, EntryRecord<V>>,
    timers: DashMap<K, ExpiryTimer>,
    capacity: usize,
    count: AtomicUsize,
    generation: AtomicU64,
}

impl<K, V> ActiveTier<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            timers: DashMap::new(),
            capacity,
            count: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn has_room(&self) -> bool {
        self.len() < self.capacity
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a fresh entry and arms its timer, or replaces the value of
    /// an already-present key (which never costs a capacity slot). A
    /// brand-new key is rejected — `Err` returning `key`/`record` back to
    /// the caller rather than dropping them — if every slot is taken per
    /// spec.md §4.2: "the caller (the LFU engine) is responsible for
    /// making room first". The capacity check and the reservation happen
    /// as a single `compare_exchange` on `count`, so this is race-free
    /// even when called concurrently for distinct new keys (see the
    /// struct-level doc comment); the caller must still inspect the
    /// `Err` case, since a slot it expected to be free may have been
    /// taken by a concurrent caller in between.
    pub fn insert(
        &self,
        key: K,
        record: EntryRecord<V>,
        ttl_ms: u64,
        expired_tx: Sender<Expired<K>>,
    ) -> Result<(), (K, EntryRecord<V>)> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.insert(record);
                self.arm_timer(key, ttl_ms, expired_tx);
                Ok(())
            }
            Entry::Vacant(vacant) => loop {
                let current = self.count.load(Ordering::SeqCst);
                if current >= self.capacity {
                    return Err((key, record));
                }
                if self
                    .count
                    .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    vacant.insert(record);
                    self.arm_timer(key, ttl_ms, expired_tx);
                    return Ok(());
                }
            },
        }
    }

    fn arm_timer(&self, key: K, ttl_ms: u64, expired_tx: Sender<Expired<K>>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = ExpiryTimer::spawn(key.clone(), ttl_ms, generation, expired_tx);
        self.timers.insert(key, timer);
    }

    /// Stops the previous timer's effect (by generation mismatch) and
    /// starts a fresh one. spec.md §4.2: "if expiry has already been
    /// dispatched for key `k` but not yet consumed, `restart_timer` must
    /// cancel its effect" — the new generation recorded here makes the
    /// stale in-flight delivery unrecognizable to
    /// `CacheController::handle_expired`.
    pub fn restart_timer(&self, key: &K, ttl_ms: u64, expired_tx: Sender<Expired<K>>) {
        if self.entries.contains_key(key) {
            self.arm_timer(key.clone(), ttl_ms, expired_tx);
        }
    }

    /// Returns the generation currently recorded for `key`, or `None` if
    /// the key has no live timer (already removed).
    pub fn current_generation(&self, key: &K) -> Option<u64> {
        self.timers.get(key).map(|t| t.generation())
    }

    /// Atomic lookup-and-increment: returns a clone of the value and bumps
    /// frequency in one critical section, closing the `contains -> get ->
    /// mutate` TOCTOU gap spec.md §5/§9 calls out.
    pub fn lookup_increment(&self, key: &K) -> Option<V> {
        self.entries.get_mut(key).map(|mut entry| {
            entry.increment_frequency();
            entry.value.clone()
        })
    }

    /// Applies `update` semantics in place: replaces the value, bumps
    /// `modified_at`, preserves `on_expire` unless a new one is supplied.
    /// Returns `true` if the key existed.
    pub fn update_in_place(
        &self,
        key: &K,
        value: V,
        new_on_expire: Option<std::sync::Arc<dyn Fn() -> V + Send + Sync>>,
    ) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.apply_update(value, new_on_expire);
                true
            }
            None => false,
        }
    }

    /// Applies the refresh-on-expire transition in place (`Expiring ->
    /// Live`). Returns `true` if the key still existed.
    pub fn refresh_in_place(&self, key: &K, value: V) -> bool {
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.refresh(value);
                true
            }
            None => false,
        }
    }

    /// Removes a key from both maps. Idempotent: a second call on an
    /// absent key simply returns `None`.
    pub fn remove(&self, key: &K) -> Option<EntryRecord<V>> {
        self.timers.remove(key);
        let removed = self.entries.remove(key).map(|(_, record)| record);
        if removed.is_some() {
            self.count.fetch_sub(1, Ordering::SeqCst);
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.timers.clear();
        self.count.store(0, Ordering::SeqCst);
    }

    /// Finds the key with the lowest frequency, first occurrence wins
    /// ties. Generalizes `cachelito-core`'s
    /// `utils::find_min_frequency_key` from a `VecDeque`-ordered scan to a
    /// direct `DashMap` iteration (this tier has no order queue — FIFO/LRU
    /// ordering is out of scope for an LFU-only cache).
    pub fn find_min_frequency_key(&self) -> Option<K> {
        let mut min_key: Option<K> = None;
        let mut min_freq = u64::MAX;
        for entry in self.entries.iter() {
            if entry.value().frequency < min_freq {
                min_freq = entry.value().frequency;
                min_key = Some(entry.key().clone());
            }
        }
        min_key
    }

    pub fn peek(&self, key: &K) -> Option<EntryRecord<V>> {
        self.entries.get(key).map(|e| e.clone())
    }

    pub fn snapshot_keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn insert_rejected_when_full() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(1);
        let (tx, _rx) = channel();
        assert!(tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx.clone()).is_ok());
        let rejected = tier.insert("b".to_string(), EntryRecord::new(2), 10_000, tx);
        let (returned_key, returned_record) = rejected.unwrap_err();
        assert_eq!(returned_key, "b".to_string());
        assert_eq!(returned_record.value, 2);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn lookup_increment_bumps_frequency_and_returns_value() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(10);
        let (tx, _rx) = channel();
        tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx).unwrap();
        assert_eq!(tier.lookup_increment(&"a".to_string()), Some(1));
        let entry = tier.peek(&"a".to_string()).unwrap();
        assert_eq!(entry.frequency, 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(10);
        let (tx, _rx) = channel();
        tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx).unwrap();
        assert!(tier.remove(&"a".to_string()).is_some());
        assert!(tier.remove(&"a".to_string()).is_none());
    }

    #[test]
    fn remove_releases_the_capacity_slot_it_held() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(1);
        let (tx, _rx) = channel();
        tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx.clone()).unwrap();
        tier.remove(&"a".to_string());
        assert!(tier.insert("b".to_string(), EntryRecord::new(2), 10_000, tx).is_ok());
    }

    #[test]
    fn restart_timer_changes_generation() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(10);
        let (tx, _rx) = channel();
        tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx.clone()).unwrap();
        let gen1 = tier.current_generation(&"a".to_string()).unwrap();
        tier.restart_timer(&"a".to_string(), 10_000, tx);
        let gen2 = tier.current_generation(&"a".to_string()).unwrap();
        assert_ne!(gen1, gen2);
    }

    #[test]
    fn find_min_frequency_key_breaks_ties_by_first_encountered() {
        let tier: ActiveTier<String, i32> = ActiveTier::new(10);
        let (tx, _rx) = channel();
        tier.insert("a".to_string(), EntryRecord::new(1), 10_000, tx.clone()).unwrap();
        tier.insert("b".to_string(), EntryRecord::new(2), 10_000, tx).unwrap();
        // both start at frequency 1; some key must be returned
        assert!(tier.find_min_frequency_key().is_some());
    }

    /// Concurrent inserts of distinct new keys must never push `len()`
    /// past `capacity`, even though each thread observes the same
    /// pre-insert state before the race.
    #[test]
    fn concurrent_inserts_never_exceed_capacity() {
        use std::sync::Arc;
        use std::thread;

        let tier = Arc::new(ActiveTier::<String, i32>::new(4));
        let (tx, _rx) = channel();

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let tier = tier.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    tier.insert(format!("k{i}"), EntryRecord::new(i), 10_000, tx)
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.join().unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 4);
        assert_eq!(tier.len(), 4);
    }
}
