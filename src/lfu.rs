use std::sync::mpsc::Sender;

use crate::active::ActiveTier;
use crate::dormant::DormantStore;
use crate::entry::EntryRecord;
use crate::key::{CacheKey, CacheValue};
use crate::timer::Expired;

/// The decision procedure that moves entries across the tier boundary
/// (spec.md §4.3).
///
/// Stateless by design — it only ever acts on the `ActiveTier` and
/// `DormantStore` handed to it — mirroring how `cachelito-core`'s
/// eviction helpers (`utils::find_min_frequency_key` and friends) are free
/// functions over borrowed cache state rather than stateful objects.
pub struct LFUEngine;

impl LFUEngine {
    /// Places an incoming `(key, record)` per spec.md §4.3's three-way
    /// algorithm: promote dormant candidates into free slots, or
    /// write-through/evict when the active tier is full.
    pub fn place<K, V>(
        active: &ActiveTier<K, V>,
        dormant: &dyn DormantStore<K, V>,
        key: K,
        record: EntryRecord<V>,
        active_ttl_ms: u64,
        expired_tx: Sender<Expired<K>>,
    ) where
        K: CacheKey,
        V: CacheValue,
    {
        let empty_slots = active.capacity().saturating_sub(active.len());

        if empty_slots > 0 {
            let mut promoted: Vec<(K, EntryRecord<V>)> = Vec::new();
            let result = dormant.mutate(&mut |dormant_map| {
                let candidates: Vec<K> = dormant_map
                    .iter()
                    .filter(|(_, r)| r.frequency > record.frequency)
                    .map(|(k, _)| k.clone())
                    .take(empty_slots)
                    .collect();
                for candidate_key in candidates {
                    if let Some(candidate_record) = dormant_map.remove(&candidate_key) {
                        promoted.push((candidate_key, candidate_record));
                    }
                }
            });
            if let Err(err) = result {
                tracing::warn!(error = %err, "failed to persist dormant tier after promotion");
            }

            if promoted.is_empty() {
                // Nothing was promoted out of dormant; the newcomer takes a
                // free slot itself.
                if let Err((key, record)) = active.insert(key, record, active_ttl_ms, expired_tx) {
                    // A concurrent caller took the slot first; the newcomer
                    // still has to land somewhere.
                    Self::write_through(dormant, key, record);
                }
                return;
            }

            for (candidate_key, candidate_record) in promoted {
                if let Err((k, r)) =
                    active.insert(candidate_key, candidate_record, active_ttl_ms, expired_tx.clone())
                {
                    // The slot this promotion was counting on disappeared
                    // under a concurrent insert; the record must not be lost.
                    Self::write_through(dormant, k, r);
                }
            }
            // The promotions filled the slots; the candidate itself is not placed.
            return;
        }

        match active.find_min_frequency_key() {
            Some(min_key) => {
                let min_record = active.peek(&min_key);
                let min_freq = min_record.as_ref().map(|r| r.frequency).unwrap_or(0);
                if min_freq >= record.frequency {
                    Self::write_through(dormant, key, record);
                } else if let Some(evicted) = active.remove(&min_key) {
                    Self::write_through(dormant, min_key, evicted);
                    if let Err((key, record)) = active.insert(key, record, active_ttl_ms, expired_tx) {
                        Self::write_through(dormant, key, record);
                    }
                }
            }
            None => {
                // Capacity is zero; there is nowhere to place a newcomer.
                Self::write_through(dormant, key, record);
            }
        }
    }

    /// Writes a record directly to the dormant tier without ever entering
    /// the active tier (spec.md §4.3 step 3b / glossary "write-through").
    pub fn write_through<K, V>(dormant: &dyn DormantStore<K, V>, key: K, record: EntryRecord<V>)
    where
        K: CacheKey,
        V: CacheValue,
    {
        let mut key = Some(key);
        let mut record = Some(record);
        let result = dormant.mutate(&mut |dormant_map| {
            if let (Some(key), Some(record)) = (key.take(), record.take()) {
                dormant_map.insert(key, record);
            }
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier on write-through");
        }
    }

    /// Promotes the single highest-frequency dormant record directly into
    /// a known-free active slot (spec.md §4.6, `Expiring -> Removed`).
    ///
    /// This bypasses the full decision procedure on purpose — resolving
    /// spec.md §9's third open question: re-entering `place`/`add` here
    /// would not terminate under an adversarial frequency distribution,
    /// since the freshly promoted record could itself immediately qualify
    /// for a further promotion.
    pub fn promote_highest<K, V>(
        active: &ActiveTier<K, V>,
        dormant: &dyn DormantStore<K, V>,
        active_ttl_ms: u64,
        expired_tx: Sender<Expired<K>>,
    ) where
        K: CacheKey,
        V: CacheValue,
    {
        if !active.has_room() {
            return;
        }
        let mut promoted: Option<(K, EntryRecord<V>)> = None;
        let result = dormant.mutate(&mut |dormant_map| {
            let best = dormant_map
                .iter()
                .max_by_key(|(_, r)| r.frequency)
                .map(|(k, _)| k.clone());
            if let Some(best_key) = best {
                if let Some(record) = dormant_map.remove(&best_key) {
                    promoted = Some((best_key, record));
                }
            }
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier after highest-frequency promotion");
            return;
        }
        if let Some((best_key, record)) = promoted {
            if let Err((key, record)) = active.insert(best_key, record, active_ttl_ms, expired_tx) {
                Self::write_through(dormant, key, record);
            }
        }
    }
}
