use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::entry::EntryRecord;
use crate::error::DormantError;
use crate::key::{CacheKey, CacheValue};

/// The cold-tier capability contract (spec.md §4.5). A `CacheController`
/// only ever holds an `Arc<dyn DormantStore<K, V>>`, so alternative
/// backends (a database, a remote KV store, …) can be swapped in at
/// `initialize` time without touching the controller or the LFU engine —
/// the "pluggable dormant store" redesign guidance of spec.md §9.
pub trait DormantStore<K, V>: Send + Sync {
    /// Returns the current valid contents, filtering out any record whose
    /// age exceeds the store's logical TTL.
    fn read(&self) -> HashMap<K, EntryRecord<V>>;

    /// Persists the full mapping, replacing prior contents.
    fn write(&self, records: &HashMap<K, EntryRecord<V>>) -> Result<(), DormantError>;

    /// Reads the current contents, lets `f` mutate them in place, and
    /// writes the result back — as a single critical section an
    /// implementor must hold its lock across, not as a `read` followed
    /// later by a `write`. Every caller that needs to inspect-then-modify
    /// the dormant mapping (promotion, write-through, `update`, `remove`,
    /// `dispose`, …) goes through this instead of pairing `read`/`write`
    /// itself: spec.md §5's "the dormant mutex totally orders all
    /// read/write/clear calls" only holds if the compound sequences
    /// callers actually perform are themselves atomic with respect to
    /// each other, not just each half in isolation — two concurrent
    /// `read`-then-`write` pairs can otherwise interleave and the second
    /// writer silently clobbers the first writer's change.
    fn mutate(
        &self,
        f: &mut dyn FnMut(&mut HashMap<K, EntryRecord<V>>),
    ) -> Result<(), DormantError>;

    /// Drops all stored records.
    fn clear(&self) -> Result<(), DormantError>;

    /// Whether the backing store currently exists.
    fn exists(&self) -> bool;

    /// Whether the backing store currently holds no valid records.
    fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Whether the backing store can currently be read from/written to.
    fn is_accessible(&self) -> bool;

    /// Idempotent preparation of the backing store (e.g. create the file
    /// and its parent directory).
    fn ensure_exists(&self) -> Result<(), DormantError>;

    /// Last-known cardinality; may lag behind the true count until the
    /// next `read`/`write` (used by `CacheController::previous_count`).
    fn count(&self) -> usize;
}

/// On-disk shape of a single dormant record. `on_expire` has no disk
/// representation (spec.md §3: its lifetime is tied to the in-memory
/// record), so it is simply absent here and reconstructed as `None` by
/// `EntryRecord::from_parts`.
#[derive(Serialize, Deserialize)]
struct PersistedRecord<K, V> {
    key: K,
    value: V,
    frequency: u64,
    created_at_unix_ms: u64,
    modified_at_unix_ms: u64,
}

/// Default file-backed `DormantStore`: a single JSON document holding
/// every record, rewritten whole on each `write` (spec.md §4.5/§6).
///
/// Grounded on `quickleaf`'s `persist`-feature file-backup pattern
/// (`cache_backup.rs` in the retrieval pack), generalized from its
/// rusqlite-backed document store to a `serde_json` whole-file document —
/// spec.md §6 leaves the format open ("any format that round-trips the
/// record … suffices"), and JSON keeps this crate's dependency stack
/// aligned with the `serde`/`serde_json` combination the wider pack favors
/// for exactly this kind of whole-document persistence.
///
/// Concurrent access within the process is serialized by a single mutex
/// held across each file operation (spec.md §4.5/§5): only one thread
/// reads or writes the file at a time, matching the dormant tier's
/// "single-writer, single-reader-at-a-time" ordering guarantee.
pub struct FileDormantStore {
    path: PathBuf,
    dormant_ttl_ms: u64,
    io_lock: Mutex<()>,
    last_count: AtomicUsize,
}

impl FileDormantStore {
    pub fn new(path: impl Into<PathBuf>, dormant_ttl_ms: u64) -> Self {
        Self {
            path: path.into(),
            dormant_ttl_ms,
            io_lock: Mutex::new(()),
            last_count: AtomicUsize::new(0),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone();
        let file_name = tmp
            .file_name()
            .map(|n| format!("{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| "dormant.json.tmp".to_string());
        tmp.set_file_name(file_name);
        tmp
    }

    fn read_raw<K, V>(&self) -> Result<Vec<PersistedRecord<K, V>>, DormantError>
    where
        K: serde::de::DeserializeOwned,
        V: serde::de::DeserializeOwned,
    {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<PersistedRecord<K, V>> = serde_json::from_str(&contents)?;
        Ok(records)
    }

    /// The body of `read`, assuming `io_lock` is already held by the
    /// caller. Never locks itself, so it composes inside `mutate`'s
    /// single critical section without deadlocking on `io_lock`.
    fn read_locked<K, V>(&self) -> HashMap<K, EntryRecord<V>>
    where
        K: CacheKey,
        V: CacheValue,
    {
        let raw = match self.read_raw::<K, V>() {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, path = %self.path.display(), "dormant store read failed, treating as empty");
                self.last_count.store(0, Ordering::SeqCst);
                return HashMap::new();
            }
        };
        let mut out = HashMap::with_capacity(raw.len());
        for record in raw {
            let entry = EntryRecord::from_parts(
                record.value,
                record.frequency,
                record.created_at_unix_ms,
                record.modified_at_unix_ms,
            );
            if !entry.is_logically_expired(self.dormant_ttl_ms) {
                out.insert(record.key, entry);
            }
        }
        self.last_count.store(out.len(), Ordering::SeqCst);
        out
    }

    /// The body of `write`, assuming `io_lock` is already held by the
    /// caller. See `read_locked`.
    fn write_locked<K, V>(&self, records: &HashMap<K, EntryRecord<V>>) -> Result<(), DormantError>
    where
        K: CacheKey,
        V: CacheValue,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let persisted: Vec<PersistedRecord<&K, &V>> = records
            .iter()
            .map(|(key, entry)| PersistedRecord {
                key,
                value: &entry.value,
                frequency: entry.frequency,
                created_at_unix_ms: entry.created_at_unix_ms(),
                modified_at_unix_ms: entry.modified_at_unix_ms(),
            })
            .collect();
        let body = serde_json::to_string(&persisted)?;
        let tmp = self.tmp_path();
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        self.last_count.store(records.len(), Ordering::SeqCst);
        Ok(())
    }
}

impl<K, V> DormantStore<K, V> for FileDormantStore
where
    K: CacheKey,
    V: CacheValue,
{
    fn read(&self) -> HashMap<K, EntryRecord<V>> {
        let _guard = self.io_lock.lock();
        self.read_locked()
    }

    fn write(&self, records: &HashMap<K, EntryRecord<V>>) -> Result<(), DormantError> {
        let _guard = self.io_lock.lock();
        self.write_locked(records)
    }

    fn mutate(
        &self,
        f: &mut dyn FnMut(&mut HashMap<K, EntryRecord<V>>),
    ) -> Result<(), DormantError> {
        let _guard = self.io_lock.lock();
        let mut records = self.read_locked();
        f(&mut records);
        self.write_locked(&records)
    }

    fn clear(&self) -> Result<(), DormantError> {
        let _guard = self.io_lock.lock();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        self.last_count.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn is_accessible(&self) -> bool {
        match self.path.parent() {
            Some(parent) => parent.exists() || fs::create_dir_all(parent).is_ok(),
            None => true,
        }
    }

    fn ensure_exists(&self) -> Result<(), DormantError> {
        let _guard = self.io_lock.lock();
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !self.path.exists() {
            fs::write(&self.path, "[]")?;
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.last_count.load(Ordering::SeqCst)
    }
}

/// Used only by tests that want to assert on a store's configured path.
#[allow(dead_code)]
pub(crate) fn path_of(store: &FileDormantStore) -> &Path {
    &store.path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileDormantStore::new(dir.path().join("d.json"), 60_000);
        let mut records = HashMap::new();
        records.insert("a".to_string(), EntryRecord::new(1));
        records.insert("b".to_string(), EntryRecord::new(2));
        DormantStore::<String, i32>::write(&store, &records).unwrap();

        let read_back = DormantStore::<String, i32>::read(&store);
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back.get("a").unwrap().value, 1);
    }

    #[test]
    fn read_filters_logically_expired_records() {
        let dir = tempdir().unwrap();
        let store = FileDormantStore::new(dir.path().join("d.json"), 0);
        let mut records = HashMap::new();
        records.insert("a".to_string(), EntryRecord::new(1));
        DormantStore::<String, i32>::write(&store, &records).unwrap();

        let read_back = DormantStore::<String, i32>::read(&store);
        assert!(read_back.is_empty());
    }

    #[test]
    fn read_of_missing_file_is_empty_not_an_error() {
        let dir = tempdir().unwrap();
        let store = FileDormantStore::new(dir.path().join("missing.json"), 60_000);
        assert!(DormantStore::<String, i32>::read(&store).is_empty());
    }

    #[test]
    fn corrupt_file_is_treated_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.json");
        fs::write(&path, "not json").unwrap();
        let store = FileDormantStore::new(path, 60_000);
        assert!(DormantStore::<String, i32>::read(&store).is_empty());
    }

    #[test]
    fn write_leaves_no_tmp_file_behind_on_success() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.json");
        let store = FileDormantStore::new(&path, 60_000);
        let mut records = HashMap::new();
        records.insert("a".to_string(), EntryRecord::new(1));
        DormantStore::<String, i32>::write(&store, &records).unwrap();
        assert!(!store.tmp_path().exists());
        assert!(path.exists());
    }

    #[test]
    fn clear_empties_store() {
        let dir = tempdir().unwrap();
        let store = FileDormantStore::new(dir.path().join("d.json"), 60_000);
        let mut records = HashMap::new();
        records.insert("a".to_string(), EntryRecord::new(1));
        DormantStore::<String, i32>::write(&store, &records).unwrap();
        DormantStore::<String, i32>::clear(&store).unwrap();
        assert!(DormantStore::<String, i32>::read(&store).is_empty());
    }
}
