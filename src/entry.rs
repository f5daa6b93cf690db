use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// The unit of cached data stored in either tier.
///
/// This is the generalized form of the teacher crate's `CacheEntry<R>`: it
/// keeps the `value`/`frequency` pair but adds `modified_at` (distinct from
/// `created_at`, needed because the dormant tier's logical TTL is measured
/// from creation while `update` must still report a fresh modification
/// time) and an optional `on_expire` refresh hook.
///
/// # Examples
///
/// ```
/// use tiercache::EntryRecord;
///
/// let entry = EntryRecord::new(42);
/// assert_eq!(entry.value, 42);
/// assert_eq!(entry.frequency, 1);
/// assert!(entry.created_at_unix_ms() <= entry.modified_at_unix_ms());
/// ```
#[derive(Clone)]
pub struct EntryRecord<V> {
    pub value: V,
    pub frequency: u64,
    created_at_unix_ms: u64,
    modified_at_unix_ms: u64,
    pub on_expire: Option<Arc<dyn Fn() -> V + Send + Sync>>,
}

impl<V> EntryRecord<V> {
    /// Creates a fresh record with `frequency = 1` and both timestamps set
    /// to now, per spec.md's `frequency >= 1 while the record exists in
    /// either tier` invariant.
    pub fn new(value: V) -> Self {
        let now = now_unix_ms();
        Self {
            value,
            frequency: 1,
            created_at_unix_ms: now,
            modified_at_unix_ms: now,
            on_expire: None,
        }
    }

    /// Creates a record with an explicit refresh hook invoked on TTL
    /// expiry (spec.md §3, `on_expire`).
    pub fn with_on_expire(value: V, on_expire: Arc<dyn Fn() -> V + Send + Sync>) -> Self {
        let mut record = Self::new(value);
        record.on_expire = Some(on_expire);
        record
    }

    /// Reconstructs a record from its persisted fields (dormant tier
    /// round-trip). `on_expire` is never persisted, so it is always `None`
    /// for a record loaded from disk (SPEC_FULL.md §4.5).
    pub fn from_parts(
        value: V,
        frequency: u64,
        created_at_unix_ms: u64,
        modified_at_unix_ms: u64,
    ) -> Self {
        Self {
            value,
            frequency: frequency.max(1),
            created_at_unix_ms,
            modified_at_unix_ms,
            on_expire: None,
        }
    }

    pub fn created_at_unix_ms(&self) -> u64 {
        self.created_at_unix_ms
    }

    pub fn modified_at_unix_ms(&self) -> u64 {
        self.modified_at_unix_ms
    }

    /// Increments the access frequency counter (LFU bookkeeping).
    pub fn increment_frequency(&mut self) {
        self.frequency = self.frequency.saturating_add(1);
    }

    /// Replaces the value, bumps `modified_at`, and — unless `new_on_expire`
    /// is supplied — preserves the existing refresh hook (SPEC_FULL.md §9:
    /// "preserve unless the caller supplies a new one explicitly").
    pub fn apply_update(&mut self, value: V, new_on_expire: Option<Arc<dyn Fn() -> V + Send + Sync>>) {
        self.value = value;
        self.modified_at_unix_ms = now_unix_ms();
        if new_on_expire.is_some() {
            self.on_expire = new_on_expire;
        }
    }

    /// Replaces the value via the refresh hook on TTL expiry. Frequency is
    /// untouched (spec.md §8 scenario 4: "frequency unchanged by the
    /// refresh itself").
    pub fn refresh(&mut self, value: V) {
        self.value = value;
        self.modified_at_unix_ms = now_unix_ms();
    }

    /// Dormant-tier logical TTL check (spec.md §3): age is measured from
    /// `created_at`, not `modified_at`.
    pub fn is_logically_expired(&self, ttl_ms: u64) -> bool {
        now_unix_ms().saturating_sub(self.created_at_unix_ms) >= ttl_ms
    }
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_entry_has_frequency_one() {
        let entry = EntryRecord::new("a");
        assert_eq!(entry.frequency, 1);
        assert_eq!(entry.created_at_unix_ms(), entry.modified_at_unix_ms());
    }

    #[test]
    fn apply_update_preserves_on_expire_by_default() {
        let mut entry = EntryRecord::with_on_expire(1, Arc::new(|| 2));
        entry.apply_update(10, None);
        assert_eq!(entry.value, 10);
        assert!(entry.on_expire.is_some());
    }

    #[test]
    fn apply_update_replaces_on_expire_when_given() {
        let mut entry = EntryRecord::with_on_expire(1, Arc::new(|| 2));
        entry.apply_update(10, Some(Arc::new(|| 99)));
        let hook = entry.on_expire.unwrap();
        assert_eq!(hook(), 99);
    }

    #[test]
    fn refresh_does_not_change_frequency() {
        let mut entry = EntryRecord::new(1);
        entry.increment_frequency();
        let freq_before = entry.frequency;
        entry.refresh(2);
        assert_eq!(entry.frequency, freq_before);
        assert_eq!(entry.value, 2);
    }

    #[test]
    fn logically_expired_after_ttl() {
        let entry = EntryRecord::from_parts("x", 1, 0, 0);
        assert!(entry.is_logically_expired(0));
    }

    #[test]
    fn from_parts_never_has_on_expire() {
        let entry = EntryRecord::from_parts(1, 5, 0, 0);
        assert!(entry.on_expire.is_none());
    }
}
