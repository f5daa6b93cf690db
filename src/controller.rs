use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use crate::active::ActiveTier;
use crate::cleaner::Cleaner;
use crate::config::CacheConfig;
use crate::dormant::{DormantStore, FileDormantStore};
use crate::entry::EntryRecord;
use crate::error::CacheEvent;
use crate::key::{CacheKey, CacheValue};
use crate::lfu::LFUEngine;
use crate::timer::Expired;

/// The public facade composing the active tier, the dormant store, the LFU
/// engine, and the background cleaner into a single cache handle
/// (spec.md §4.1).
///
/// `initialize` returns an owned `Arc<CacheController<K, V>>` rather than
/// mutating hidden static state (spec.md §9's singleton redesign guidance)
/// — a caller that wants process-wide sharing stores the `Arc` itself, or
/// registers it under a name via [`crate::registry`].
pub struct CacheController<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    config: CacheConfig,
    active: Arc<ActiveTier<K, V>>,
    dormant: Arc<dyn DormantStore<K, V>>,
    expired_tx: Sender<Expired<K>>,
    event_tx: Sender<CacheEvent>,
    disposed: Arc<AtomicBool>,
}

impl<K, V> CacheController<K, V>
where
    K: CacheKey,
    V: CacheValue,
{
    /// Builds a new cache from `config`, optionally with a caller-supplied
    /// `DormantStore` in place of the default `FileDormantStore` (spec.md
    /// §9's "pluggable dormant store"). Loads the top-`capacity` dormant
    /// records by frequency into the active tier (the "restart load"
    /// scenario of spec.md §8), then starts the expiry-handling worker and
    /// the background `Cleaner`.
    ///
    /// Returns the controller handle alongside the receiving end of its
    /// `EmptyCache` event channel.
    pub fn initialize(
        config: CacheConfig,
        dormant_store: Option<Arc<dyn DormantStore<K, V>>>,
    ) -> (Arc<Self>, Receiver<CacheEvent>) {
        let dormant = dormant_store.unwrap_or_else(|| {
            Arc::new(FileDormantStore::new(
                config.dormant_path.clone(),
                config.dormant_ttl_ms,
            )) as Arc<dyn DormantStore<K, V>>
        });
        if let Err(err) = dormant.ensure_exists() {
            tracing::warn!(error = %err, "failed to prepare dormant store at initialize");
        }

        let active = Arc::new(ActiveTier::new(config.capacity));
        let (expired_tx, expired_rx) = channel::<Expired<K>>();
        let (event_tx, event_rx) = channel::<CacheEvent>();
        let disposed = Arc::new(AtomicBool::new(false));

        Self::load_from_dormant(&active, dormant.as_ref(), config.active_ttl_ms, expired_tx.clone());

        let controller = Arc::new(Self {
            config: config.clone(),
            active: active.clone(),
            dormant: dormant.clone(),
            expired_tx: expired_tx.clone(),
            event_tx: event_tx.clone(),
            disposed: disposed.clone(),
        });

        Self::spawn_expired_worker(controller.clone(), expired_rx);
        Cleaner::spawn(active, dormant, config.cleaner_period_ms, event_tx, disposed);

        (controller, event_rx)
    }

    /// Promotes the `capacity` highest-frequency dormant records into the
    /// fresh active tier at startup, ranking by iteration over the dormant
    /// snapshot (spec.md §8 scenario 5).
    fn load_from_dormant(
        active: &ActiveTier<K, V>,
        dormant: &dyn DormantStore<K, V>,
        active_ttl_ms: u64,
        expired_tx: Sender<Expired<K>>,
    ) {
        let mut promoted: Vec<(K, EntryRecord<V>)> = Vec::new();
        let result = dormant.mutate(&mut |records| {
            if records.is_empty() {
                return;
            }
            let mut ranked: Vec<K> = records.keys().cloned().collect();
            ranked.sort_by_key(|k| std::cmp::Reverse(records.get(k).map(|r| r.frequency).unwrap_or(0)));
            for key in ranked.into_iter().take(active.capacity()) {
                if let Some(record) = records.remove(&key) {
                    promoted.push((key, record));
                }
            }
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier after restart load");
            return;
        }
        for (key, record) in promoted {
            if let Err((key, record)) = active.insert(key, record, active_ttl_ms, expired_tx.clone()) {
                LFUEngine::write_through(dormant, key, record);
            }
        }
    }

    fn spawn_expired_worker(controller: Arc<Self>, expired_rx: Receiver<Expired<K>>) {
        thread::spawn(move || {
            while let Ok(event) = expired_rx.recv() {
                if controller.disposed.load(Ordering::SeqCst) {
                    return;
                }
                controller.handle_expired(event);
            }
        });
    }

    /// Implements the `Expiring -> Live` / `Expiring -> Removed` transitions
    /// of spec.md §4.6. A delivered event whose generation no longer
    /// matches the key's current timer generation is a stale delivery from
    /// a timer that `restart_timer` has since superseded, and is ignored.
    fn handle_expired(&self, event: Expired<K>) {
        let Expired { key, generation } = event;
        if self.active.current_generation(&key) != Some(generation) {
            return;
        }
        let Some(record) = self.active.peek(&key) else {
            return;
        };

        match record.on_expire.clone() {
            Some(hook) => {
                let refreshed = hook();
                self.active.refresh_in_place(&key, refreshed);
                self.active
                    .restart_timer(&key, self.config.active_ttl_ms, self.expired_tx.clone());
            }
            None => {
                self.active.remove(&key);
                if self.active.is_empty() && self.dormant.is_empty() {
                    let _ = self.event_tx.send(CacheEvent::EmptyCache);
                } else {
                    LFUEngine::promote_highest(
                        &self.active,
                        self.dormant.as_ref(),
                        self.config.active_ttl_ms,
                        self.expired_tx.clone(),
                    );
                }
            }
        }
    }

    /// Adds `key`/`value` with no refresh hook. No-op if disposed or if
    /// `key` is blank (spec.md §4.1 "invalid-input").
    pub fn add(&self, key: K, value: V) {
        self.add_with_on_expire(key, value, None)
    }

    /// Adds `key`/`value` with an explicit `on_expire` hook invoked on TTL
    /// expiry while the entry lives in the active tier.
    pub fn add_with_on_expire(
        &self,
        key: K,
        value: V,
        on_expire: Option<Arc<dyn Fn() -> V + Send + Sync>>,
    ) {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("add called after dispose; ignored");
            return;
        }
        if key.is_blank() {
            return;
        }
        let record = match on_expire {
            Some(hook) => EntryRecord::with_on_expire(value, hook),
            None => EntryRecord::new(value),
        };
        LFUEngine::place(
            &self.active,
            self.dormant.as_ref(),
            key,
            record,
            self.config.active_ttl_ms,
            self.expired_tx.clone(),
        );
    }

    /// Updates the value for `key` wherever it currently lives. A
    /// dormant-only key is first promoted via the LFU engine before the
    /// update is applied (spec.md §9's resolved open question), never
    /// leaving the same logical entry mutated in both tiers. Frequency is
    /// left unchanged. Returns whether `key` was found.
    pub fn update(&self, key: K, value: V) -> bool {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("update called after dispose; ignored");
            return false;
        }
        if key.is_blank() {
            return false;
        }

        if self.active.contains(&key) {
            self.active.update_in_place(&key, value, None);
            self.active
                .restart_timer(&key, self.config.active_ttl_ms, self.expired_tx.clone());
            return true;
        }

        let mut removed: Option<EntryRecord<V>> = None;
        let result = self.dormant.mutate(&mut |dormant_map| {
            removed = dormant_map.remove(&key);
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier before promoting updated key");
        }
        if let Some(mut record) = removed {
            record.apply_update(value, None);
            LFUEngine::place(
                &self.active,
                self.dormant.as_ref(),
                key,
                record,
                self.config.active_ttl_ms,
                self.expired_tx.clone(),
            );
            return true;
        }

        false
    }

    /// Searches both tiers, incrementing frequency on a hit. A dormant hit
    /// is considered for promotion via the LFU engine.
    pub fn get(&self, key: &K) -> Option<V> {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("get called after dispose; ignored");
            return None;
        }
        if let Some(value) = self.active.lookup_increment(key) {
            return Some(value);
        }
        self.get_from_dormant(key)
    }

    fn get_from_dormant(&self, key: &K) -> Option<V> {
        let mut removed: Option<EntryRecord<V>> = None;
        let result = self.dormant.mutate(&mut |dormant_map| {
            removed = dormant_map.remove(key);
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier after lookup");
        }
        let mut record = removed?;
        record.increment_frequency();
        let value = record.value.clone();
        LFUEngine::place(
            &self.active,
            self.dormant.as_ref(),
            key.clone(),
            record,
            self.config.active_ttl_ms,
            self.expired_tx.clone(),
        );
        Some(value)
    }

    /// As [`get`](Self::get) but reports only whether `key` was found.
    pub fn lookup(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Active-tier-only lookup; increments frequency on a hit.
    pub fn get_active(&self, key: &K) -> Option<V> {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("get_active called after dispose; ignored");
            return None;
        }
        self.active.lookup_increment(key)
    }

    /// As [`get_active`](Self::get_active) but reports only whether `key`
    /// was found.
    pub fn active_lookup(&self, key: &K) -> bool {
        self.get_active(key).is_some()
    }

    /// Removes `key` from whichever tier holds it, canceling its timer if
    /// it was active. Emits `EmptyCache` if both tiers become empty.
    pub fn remove(&self, key: &K) -> Option<EntryRecord<V>> {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("remove called after dispose; ignored");
            return None;
        }
        if let Some(record) = self.active.remove(key) {
            self.maybe_emit_empty();
            return Some(record);
        }

        let mut removed: Option<EntryRecord<V>> = None;
        let result = self.dormant.mutate(&mut |dormant_map| {
            removed = dormant_map.remove(key);
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier after remove");
        }
        if removed.is_some() {
            self.maybe_emit_empty();
        }
        removed
    }

    /// Active-tier-only variant of [`remove`](Self::remove).
    pub fn active_remove(&self, key: &K) -> Option<EntryRecord<V>> {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("active_remove called after dispose; ignored");
            return None;
        }
        let removed = self.active.remove(key);
        if removed.is_some() {
            self.maybe_emit_empty();
        }
        removed
    }

    fn maybe_emit_empty(&self) {
        if self.active.is_empty() && self.dormant.is_empty() {
            let _ = self.event_tx.send(CacheEvent::EmptyCache);
        }
    }

    /// Drops both tiers. The background cleaner keeps running and will
    /// observe the now-empty dormant store on its next tick.
    pub fn clear(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            tracing::warn!("clear called after dispose; ignored");
            return;
        }
        self.active.clear();
        if let Err(err) = self.dormant.clear() {
            tracing::warn!(error = %err, "failed to clear dormant tier");
        }
        let _ = self.event_tx.send(CacheEvent::EmptyCache);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Forces a fresh dormant read and returns its size.
    pub fn dormant_count(&self) -> usize {
        self.dormant.read().len()
    }

    /// Last-known dormant size, without forcing a read.
    pub fn previous_count(&self) -> usize {
        self.dormant.count()
    }

    pub fn count(&self) -> usize {
        self.active_count() + self.dormant_count()
    }

    /// Flushes all active records into the dormant tier (union semantics:
    /// an active record wins over a dormant record under the same key),
    /// cancels every active timer, and marks the controller disposed.
    /// Operations issued after `dispose` become no-ops logged at `warn`
    /// (spec.md §4.1/§7's "invalid-state"). Idempotent: a second `dispose`
    /// call is a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut drained: Vec<(K, EntryRecord<V>)> = Vec::new();
        for key in self.active.snapshot_keys() {
            if let Some(record) = self.active.remove(&key) {
                drained.push((key, record));
            }
        }
        let result = self.dormant.mutate(&mut |dormant_map| {
            for (key, record) in drained.drain(..) {
                dormant_map.insert(key, record);
            }
        });
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist dormant tier during dispose");
        }
        self.active.clear();
    }
}
